use super::*;
use anyhow::anyhow;
use async_trait::async_trait;
use shared::domain::TokenId;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
    time::Duration,
};
use tokio::sync::{broadcast, Notify};
use wallet_integration::{PendingTransaction, TransactionReceipt, WalletError};

const RINKEBY: ChainId = ChainId(4);

struct FakeWallet {
    authorized: Vec<AccountAddress>,
    granted: Vec<AccountAddress>,
    chain_id: ChainId,
    fail_accounts: bool,
    reject_request: bool,
    account_queries: AtomicUsize,
    authorization_requests: AtomicUsize,
}

impl FakeWallet {
    fn with_accounts(authorized: &[&str], granted: &[&str]) -> Self {
        Self {
            authorized: authorized.iter().map(|a| AccountAddress::new(*a)).collect(),
            granted: granted.iter().map(|a| AccountAddress::new(*a)).collect(),
            chain_id: RINKEBY,
            fail_accounts: false,
            reject_request: false,
            account_queries: AtomicUsize::new(0),
            authorization_requests: AtomicUsize::new(0),
        }
    }

    fn on_chain(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn accounts(&self) -> Result<Vec<AccountAddress>> {
        self.account_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_accounts {
            return Err(anyhow!("provider disconnected"));
        }
        Ok(self.authorized.clone())
    }

    async fn request_accounts(&self) -> Result<Vec<AccountAddress>> {
        self.authorization_requests.fetch_add(1, Ordering::SeqCst);
        if self.reject_request {
            return Err(WalletError::UserRejected("User rejected the request.".to_string()).into());
        }
        Ok(self.granted.clone())
    }

    async fn chain_id(&self) -> Result<ChainId> {
        Ok(self.chain_id)
    }
}

enum SubmitBehavior {
    Succeed,
    Reject,
    Fail,
}

enum ConfirmBehavior {
    Succeed,
    Fail,
    WaitFor(Arc<Notify>),
}

struct FakeContract {
    total_supply: AtomicU64,
    fail_supply: AtomicBool,
    submit: SubmitBehavior,
    confirm: ConfirmBehavior,
    supply_queries: AtomicUsize,
    submit_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    events: broadcast::Sender<MintEvent>,
}

impl FakeContract {
    fn new(total_supply: u64) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            total_supply: AtomicU64::new(total_supply),
            fail_supply: AtomicBool::new(false),
            submit: SubmitBehavior::Succeed,
            confirm: ConfirmBehavior::Succeed,
            supply_queries: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            events,
        }
    }

    fn supply_queries(&self) -> usize {
        self.supply_queries.load(Ordering::SeqCst)
    }

    fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    fn emit(&self, sender: &str, token_id: u64) {
        self.events
            .send(MintEvent {
                sender: AccountAddress::new(sender),
                token_id: TokenId(token_id),
            })
            .expect("listener registered");
    }
}

#[async_trait]
impl ContractClient for FakeContract {
    async fn total_supply(&self) -> Result<u64> {
        self.supply_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_supply.load(Ordering::SeqCst) {
            return Err(anyhow!("execution reverted"));
        }
        Ok(self.total_supply.load(Ordering::SeqCst))
    }

    async fn submit_mint(&self) -> Result<PendingTransaction> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match self.submit {
            SubmitBehavior::Succeed => Ok(PendingTransaction {
                hash: TxHash("0xfeed".to_string()),
            }),
            SubmitBehavior::Reject => {
                Err(WalletError::UserRejected("User denied signature".to_string()).into())
            }
            SubmitBehavior::Fail => Err(anyhow!("insufficient funds for gas")),
        }
    }

    async fn wait_for_confirmation(
        &self,
        pending: &PendingTransaction,
    ) -> Result<TransactionReceipt> {
        match &self.confirm {
            ConfirmBehavior::Succeed => {}
            ConfirmBehavior::Fail => return Err(anyhow!("transaction dropped")),
            ConfirmBehavior::WaitFor(release) => release.notified().await,
        }
        Ok(TransactionReceipt {
            hash: pending.hash.clone(),
            block_number: Some(16),
        })
    }

    fn subscribe_mint_events(&self) -> broadcast::Receiver<MintEvent> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.events.subscribe()
    }

    fn unsubscribe_mint_events(&self) {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingLinkOpener {
    opened: StdMutex<Vec<Url>>,
}

impl LinkOpener for RecordingLinkOpener {
    fn open(&self, url: &Url) -> Result<()> {
        self.opened.lock().expect("opened").push(url.clone());
        Ok(())
    }
}

fn config() -> SequencerConfig {
    SequencerConfig::builtin().expect("builtin config")
}

fn sequencer(wallet: FakeWallet, contract: &Arc<FakeContract>) -> Arc<WalletSequencer> {
    WalletSequencer::new(
        Some(Arc::new(wallet)),
        Arc::clone(contract) as Arc<dyn ContractClient>,
        config(),
    )
}

async fn wait_for_state(
    sequencer: &WalletSequencer,
    predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    let mut session = sequencer.watch_session();
    let state = tokio::time::timeout(Duration::from_secs(2), session.wait_for(predicate))
        .await
        .expect("state reached in time")
        .expect("session sender alive")
        .clone();
    state
}

#[tokio::test]
async fn detect_without_provider_is_a_silent_noop() {
    let contract = Arc::new(FakeContract::new(3));
    let sequencer = WalletSequencer::new(None, contract.clone(), config());

    sequencer.detect_existing_authorization().await;

    assert_eq!(sequencer.snapshot(), SessionState::default());
    assert_eq!(contract.supply_queries(), 0);
    assert_eq!(contract.subscribe_calls(), 0);
}

#[tokio::test]
async fn detect_with_preauthorized_account_subscribes_and_refreshes_once() {
    let contract = Arc::new(FakeContract::new(3));
    let sequencer = sequencer(FakeWallet::with_accounts(&["0x1"], &[]), &contract);

    sequencer.detect_existing_authorization().await;

    let state = sequencer.snapshot();
    assert_eq!(state.authorized_account, Some(AccountAddress::new("0x1")));
    assert_eq!(contract.supply_queries(), 1);
    assert_eq!(contract.subscribe_calls(), 1);
    assert_eq!(
        state.supply,
        Some(SupplyProgress {
            minted: 3,
            ceiling: 100
        })
    );
    assert_eq!(state.user_message, None);
}

#[tokio::test]
async fn detect_without_accounts_leaves_account_unset() {
    let contract = Arc::new(FakeContract::new(3));
    let sequencer = sequencer(FakeWallet::with_accounts(&[], &[]), &contract);

    sequencer.detect_existing_authorization().await;

    let state = sequencer.snapshot();
    assert!(!state.is_connected());
    assert_eq!(contract.subscribe_calls(), 0);
    assert_eq!(contract.supply_queries(), 1);
}

#[tokio::test]
async fn detect_contains_account_query_failure() {
    let contract = Arc::new(FakeContract::new(3));
    let mut wallet = FakeWallet::with_accounts(&["0x1"], &[]);
    wallet.fail_accounts = true;
    let sequencer = sequencer(wallet, &contract);

    sequencer.detect_existing_authorization().await;

    assert_eq!(sequencer.snapshot(), SessionState::default());
    assert_eq!(contract.supply_queries(), 0);
}

#[tokio::test]
async fn connect_tracks_first_account_of_latest_authorization() {
    let contract = Arc::new(FakeContract::new(5));
    let sequencer = sequencer(FakeWallet::with_accounts(&["0xa"], &["0xb", "0xc"]), &contract);

    sequencer.detect_existing_authorization().await;
    assert_eq!(
        sequencer.snapshot().authorized_account,
        Some(AccountAddress::new("0xa"))
    );

    let connected = sequencer.connect().await;
    assert_eq!(connected, Some(AccountAddress::new("0xb")));
    assert_eq!(
        sequencer.snapshot().authorized_account,
        Some(AccountAddress::new("0xb"))
    );
    assert_eq!(contract.subscribe_calls(), 1, "listener must not be duplicated");
    assert_eq!(contract.supply_queries(), 2);
}

#[tokio::test]
async fn connect_rejection_surfaces_action_failed() {
    let contract = Arc::new(FakeContract::new(5));
    let mut wallet = FakeWallet::with_accounts(&[], &["0xb"]);
    wallet.reject_request = true;
    let sequencer = sequencer(wallet, &contract);

    assert_eq!(sequencer.connect().await, None);

    let state = sequencer.snapshot();
    assert!(!state.is_connected());
    assert_eq!(
        state.user_message,
        Some(UserMessage::ActionFailed {
            action: SequencerAction::Connect
        })
    );
    assert_eq!(contract.subscribe_calls(), 0);
    assert_eq!(contract.supply_queries(), 0);
}

#[tokio::test]
async fn connect_without_provider_is_a_noop() {
    let contract = Arc::new(FakeContract::new(5));
    let sequencer = WalletSequencer::new(None, contract.clone(), config());

    assert_eq!(sequencer.connect().await, None);
    assert_eq!(sequencer.snapshot(), SessionState::default());
}

#[tokio::test]
async fn mint_confirms_and_leaves_message_to_the_event() {
    let contract = Arc::new(FakeContract::new(5));
    let sequencer = sequencer(FakeWallet::with_accounts(&["0x1"], &[]), &contract);
    sequencer.detect_existing_authorization().await;

    let outcome = sequencer.mint().await;

    match outcome {
        MintOutcome::Confirmed {
            tx_hash,
            explorer_link,
        } => {
            assert_eq!(tx_hash, TxHash("0xfeed".to_string()));
            assert_eq!(
                explorer_link.expect("explorer link").as_str(),
                "https://rinkeby.etherscan.io/tx/0xfeed"
            );
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let state = sequencer.snapshot();
    assert!(!state.mint_in_progress);
    assert_eq!(state.user_message, None);
    assert_eq!(contract.submit_calls(), 1);
}

#[tokio::test]
async fn mint_on_wrong_network_never_submits() {
    let contract = Arc::new(FakeContract::new(5));
    let sequencer = sequencer(
        FakeWallet::with_accounts(&["0x1"], &[]).on_chain(ChainId(1)),
        &contract,
    );

    let outcome = sequencer.mint().await;

    assert_eq!(
        outcome,
        MintOutcome::WrongNetwork {
            expected: RINKEBY,
            actual: ChainId(1)
        }
    );
    assert_eq!(contract.submit_calls(), 0);
    let state = sequencer.snapshot();
    assert!(!state.mint_in_progress);
    assert_eq!(
        state.user_message,
        Some(UserMessage::WrongNetwork {
            expected: RINKEBY,
            actual: ChainId(1),
            network_name: "Rinkeby Test Network".to_string(),
        })
    );
}

#[tokio::test]
async fn mint_without_provider_clears_progress() {
    let contract = Arc::new(FakeContract::new(5));
    let sequencer = WalletSequencer::new(None, contract.clone(), config());

    assert_eq!(sequencer.mint().await, MintOutcome::ProviderUnavailable);

    let state = sequencer.snapshot();
    assert!(!state.mint_in_progress);
    assert_eq!(state.user_message, None);
    assert_eq!(contract.submit_calls(), 0);
}

#[tokio::test]
async fn mint_failures_clear_progress_and_report() {
    for (submit, confirm) in [
        (SubmitBehavior::Reject, ConfirmBehavior::Succeed),
        (SubmitBehavior::Fail, ConfirmBehavior::Succeed),
        (SubmitBehavior::Succeed, ConfirmBehavior::Fail),
    ] {
        let mut contract = FakeContract::new(5);
        contract.submit = submit;
        contract.confirm = confirm;
        let contract = Arc::new(contract);
        let sequencer = sequencer(FakeWallet::with_accounts(&["0x1"], &[]), &contract);

        let outcome = sequencer.mint().await;

        assert!(
            matches!(outcome, MintOutcome::Failed { .. }),
            "unexpected outcome: {outcome:?}"
        );
        let state = sequencer.snapshot();
        assert!(!state.mint_in_progress);
        assert_eq!(
            state.user_message,
            Some(UserMessage::ActionFailed {
                action: SequencerAction::Mint
            })
        );
    }
}

#[tokio::test]
async fn mint_clears_stale_message_before_submitting() {
    let release = Arc::new(Notify::new());
    let mut contract = FakeContract::new(5);
    contract.confirm = ConfirmBehavior::WaitFor(Arc::clone(&release));
    let contract = Arc::new(contract);
    let mut wallet = FakeWallet::with_accounts(&["0x1"], &["0x1"]);
    wallet.reject_request = true;
    let sequencer = sequencer(wallet, &contract);

    sequencer.connect().await;
    assert!(sequencer.snapshot().user_message.is_some());

    let minting = tokio::spawn({
        let sequencer = Arc::clone(&sequencer);
        async move { sequencer.mint().await }
    });
    let state = wait_for_state(&sequencer, |state| state.mint_in_progress).await;
    assert_eq!(state.user_message, None);

    release.notify_one();
    minting.await.expect("mint task");
    assert!(!sequencer.snapshot().mint_in_progress);
}

#[tokio::test]
async fn concurrent_mint_is_turned_away_while_in_flight() {
    let release = Arc::new(Notify::new());
    let mut contract = FakeContract::new(5);
    contract.confirm = ConfirmBehavior::WaitFor(Arc::clone(&release));
    let contract = Arc::new(contract);
    let sequencer = sequencer(FakeWallet::with_accounts(&["0x1"], &[]), &contract);

    let first = tokio::spawn({
        let sequencer = Arc::clone(&sequencer);
        async move { sequencer.mint().await }
    });
    wait_for_state(&sequencer, |state| state.mint_in_progress).await;

    assert_eq!(sequencer.mint().await, MintOutcome::AlreadyInFlight);
    assert!(sequencer.snapshot().mint_in_progress);
    assert_eq!(contract.submit_calls(), 1);

    release.notify_one();
    let outcome = first.await.expect("first mint");
    assert!(matches!(outcome, MintOutcome::Confirmed { .. }));
    assert!(!sequencer.snapshot().mint_in_progress);
}

#[tokio::test]
async fn cancelled_mint_still_clears_progress() {
    let mut contract = FakeContract::new(5);
    contract.confirm = ConfirmBehavior::WaitFor(Arc::new(Notify::new()));
    let contract = Arc::new(contract);
    let sequencer = sequencer(FakeWallet::with_accounts(&["0x1"], &[]), &contract);

    let minting = tokio::spawn({
        let sequencer = Arc::clone(&sequencer);
        async move { sequencer.mint().await }
    });
    wait_for_state(&sequencer, |state| state.mint_in_progress).await;

    minting.abort();
    assert!(minting.await.expect_err("aborted").is_cancelled());
    assert!(!sequencer.snapshot().mint_in_progress);
    assert!(sequencer.mint_lock.try_lock().is_ok(), "in-flight lock released");
}

#[tokio::test]
async fn mint_event_updates_message_and_supply_once() {
    let contract = Arc::new(FakeContract::new(41));
    let sequencer = sequencer(FakeWallet::with_accounts(&["0x1"], &[]), &contract);

    assert!(sequencer.subscribe_to_mint_events().await);
    assert!(!sequencer.subscribe_to_mint_events().await);
    assert_eq!(contract.subscribe_calls(), 1);
    assert_eq!(contract.events.receiver_count(), 1);

    contract.total_supply.store(42, Ordering::SeqCst);
    contract.emit("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", 42);

    let state = wait_for_state(&sequencer, |state| state.supply.is_some()).await;
    assert_eq!(
        state.supply,
        Some(SupplyProgress {
            minted: 42,
            ceiling: 100
        })
    );
    match state.user_message {
        Some(UserMessage::Minted { token_id, link }) => {
            assert_eq!(token_id, TokenId(42));
            assert!(link.expect("asset link").as_str().ends_with("/42"));
        }
        other => panic!("unexpected message: {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(contract.supply_queries(), 1);
}

#[tokio::test]
async fn unsubscribe_allows_a_fresh_listener() {
    let contract = Arc::new(FakeContract::new(1));
    let sequencer = sequencer(FakeWallet::with_accounts(&["0x1"], &[]), &contract);

    assert!(sequencer.subscribe_to_mint_events().await);
    sequencer.unsubscribe().await;
    assert_eq!(contract.unsubscribe_calls(), 1);

    tokio::time::timeout(Duration::from_secs(2), async {
        while contract.events.receiver_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener released");

    assert!(sequencer.subscribe_to_mint_events().await);
    assert_eq!(contract.events.receiver_count(), 1);

    sequencer.shutdown().await;
    assert_eq!(contract.unsubscribe_calls(), 2);
}

#[tokio::test]
async fn shutdown_without_listener_leaves_event_source_alone() {
    let contract = Arc::new(FakeContract::new(1));
    let sequencer = sequencer(FakeWallet::with_accounts(&[], &[]), &contract);

    sequencer.shutdown().await;
    assert_eq!(contract.unsubscribe_calls(), 0);
}

#[tokio::test]
async fn dropping_the_sequencer_stops_the_event_source() {
    let contract = Arc::new(FakeContract::new(1));
    let sequencer = sequencer(FakeWallet::with_accounts(&["0x1"], &[]), &contract);
    assert!(sequencer.subscribe_to_mint_events().await);

    drop(sequencer);
    assert_eq!(contract.unsubscribe_calls(), 1);
}

#[tokio::test]
async fn refresh_supply_formats_progress() {
    let contract = Arc::new(FakeContract::new(7));
    let sequencer = sequencer(FakeWallet::with_accounts(&[], &[]), &contract);

    sequencer.refresh_supply().await;

    let supply = sequencer.snapshot().supply.expect("supply");
    let text = supply.to_string();
    assert!(text.contains('7'), "{text}");
    assert!(text.contains("100"), "{text}");
}

#[tokio::test]
async fn refresh_supply_failure_keeps_previous_value() {
    let contract = Arc::new(FakeContract::new(7));
    let sequencer = sequencer(FakeWallet::with_accounts(&[], &[]), &contract);
    sequencer.refresh_supply().await;

    contract.total_supply.store(9, Ordering::SeqCst);
    contract.fail_supply.store(true, Ordering::SeqCst);
    sequencer.refresh_supply().await;

    assert_eq!(contract.supply_queries(), 2);
    assert_eq!(
        sequencer.snapshot().supply,
        Some(SupplyProgress {
            minted: 7,
            ceiling: 100
        })
    );
}

#[tokio::test]
async fn view_collection_leaves_session_untouched() {
    let contract = Arc::new(FakeContract::new(2));
    let opener = Arc::new(RecordingLinkOpener::default());
    let sequencer = WalletSequencer::new_with_dependencies(
        Some(Arc::new(FakeWallet::with_accounts(&["0x1"], &[]))),
        contract.clone(),
        opener.clone(),
        config(),
    );
    sequencer.detect_existing_authorization().await;
    let before = sequencer.snapshot();

    sequencer.view_collection();

    assert_eq!(sequencer.snapshot(), before);
    let opened = opener.opened.lock().expect("opened");
    assert_eq!(opened.len(), 1);
    assert_eq!(
        opened[0].as_str(),
        "https://testnets.opensea.io/collection/dessert-nft-v4"
    );
}
