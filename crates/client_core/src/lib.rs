use std::{
    fmt,
    sync::{Arc, Weak},
};

use anyhow::Result;
use shared::{
    domain::{AccountAddress, ChainId, TxHash},
    protocol::MintEvent,
};
use tokio::{
    sync::{broadcast::error::RecvError, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use url::Url;
use wallet_integration::{is_user_rejection, ContractClient, WalletProvider};

pub mod config;
pub mod session;

pub use config::SequencerConfig;
pub use session::{SequencerAction, SessionState, SupplyProgress, UserMessage};

pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &Url) -> Result<()>;
}

pub struct LogOnlyLinkOpener;

impl LinkOpener for LogOnlyLinkOpener {
    fn open(&self, url: &Url) -> Result<()> {
        info!(url = %url, "link: open requested");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    Confirmed {
        tx_hash: TxHash,
        explorer_link: Option<Url>,
    },
    WrongNetwork {
        expected: ChainId,
        actual: ChainId,
    },
    ProviderUnavailable,
    AlreadyInFlight,
    Failed {
        reason: String,
    },
}

impl fmt::Display for MintOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed {
                tx_hash,
                explorer_link: Some(link),
            } => write!(f, "mined transaction {tx_hash}: {link}"),
            Self::Confirmed { tx_hash, .. } => write!(f, "mined transaction {tx_hash}"),
            Self::WrongNetwork { expected, actual } => {
                write!(f, "wrong network: expected chain {expected}, wallet is on {actual}")
            }
            Self::ProviderUnavailable => f.write_str("wallet provider not available"),
            Self::AlreadyInFlight => f.write_str("a mint transaction is already in flight"),
            Self::Failed { reason } => write!(f, "mint failed: {reason}"),
        }
    }
}

/// Clears the in-progress flag when the mint flow ends, however it ends.
struct MintProgressGuard<'a> {
    session: &'a watch::Sender<SessionState>,
}

impl<'a> MintProgressGuard<'a> {
    fn start(session: &'a watch::Sender<SessionState>) -> Self {
        session.send_modify(|state| {
            state.mint_in_progress = true;
            state.user_message = None;
        });
        Self { session }
    }
}

impl Drop for MintProgressGuard<'_> {
    fn drop(&mut self) {
        self.session
            .send_modify(|state| state.mint_in_progress = false);
    }
}

pub struct WalletSequencer {
    provider: Option<Arc<dyn WalletProvider>>,
    contract: Arc<dyn ContractClient>,
    link_opener: Arc<dyn LinkOpener>,
    config: SequencerConfig,
    session: watch::Sender<SessionState>,
    mint_lock: Mutex<()>,
    mint_listener: Mutex<Option<JoinHandle<()>>>,
}

impl WalletSequencer {
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        contract: Arc<dyn ContractClient>,
        config: SequencerConfig,
    ) -> Arc<Self> {
        Self::new_with_dependencies(provider, contract, Arc::new(LogOnlyLinkOpener), config)
    }

    pub fn new_with_dependencies(
        provider: Option<Arc<dyn WalletProvider>>,
        contract: Arc<dyn ContractClient>,
        link_opener: Arc<dyn LinkOpener>,
        config: SequencerConfig,
    ) -> Arc<Self> {
        let (session, _) = watch::channel(SessionState::default());
        Arc::new(Self {
            provider,
            contract,
            link_opener,
            config,
            session,
            mint_lock: Mutex::new(()),
            mint_listener: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn snapshot(&self) -> SessionState {
        self.session.borrow().clone()
    }

    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Startup check for accounts the wallet already granted; never prompts.
    pub async fn detect_existing_authorization(self: &Arc<Self>) {
        let Some(provider) = self.provider.as_ref() else {
            warn!("wallet: provider not available; skipping authorization check");
            return;
        };

        let accounts = match provider.accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!("wallet: authorized account query failed: {err:#}");
                return;
            }
        };

        match accounts.into_iter().next() {
            Some(account) => {
                info!(account = %account, "wallet: found authorized account");
                self.set_authorized_account(account);
                self.subscribe_to_mint_events().await;
            }
            None => info!("wallet: no authorized accounts"),
        }

        self.refresh_supply().await;
    }

    pub async fn connect(self: &Arc<Self>) -> Option<AccountAddress> {
        let Some(provider) = self.provider.as_ref() else {
            warn!("wallet: provider not available; connect ignored");
            return None;
        };

        let accounts = match provider.request_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                if is_user_rejection(&err) {
                    info!("wallet: user declined authorization");
                } else {
                    error!("wallet: authorization request failed: {err:#}");
                }
                self.set_user_message(UserMessage::ActionFailed {
                    action: SequencerAction::Connect,
                });
                return None;
            }
        };

        let Some(account) = accounts.into_iter().next() else {
            warn!("wallet: authorization returned no accounts");
            self.set_user_message(UserMessage::ActionFailed {
                action: SequencerAction::Connect,
            });
            return None;
        };

        info!(account = %account, "wallet: authorized account");
        self.set_authorized_account(account.clone());
        self.subscribe_to_mint_events().await;
        self.refresh_supply().await;
        Some(account)
    }

    /// Submits one mint transaction and waits for it to be mined. A second call while
    /// one is in flight is turned away. The success message arrives with the mint event.
    pub async fn mint(&self) -> MintOutcome {
        let Ok(_in_flight) = self.mint_lock.try_lock() else {
            warn!("mint: a transaction is already in flight; request ignored");
            return MintOutcome::AlreadyInFlight;
        };
        let _progress = MintProgressGuard::start(&self.session);

        let outcome = self.run_mint().await;
        if let MintOutcome::Failed { reason } = &outcome {
            error!("mint: {reason}");
            self.set_user_message(UserMessage::ActionFailed {
                action: SequencerAction::Mint,
            });
        }
        outcome
    }

    async fn run_mint(&self) -> MintOutcome {
        let Some(provider) = self.provider.as_ref() else {
            warn!("mint: provider not available");
            return MintOutcome::ProviderUnavailable;
        };

        let actual = match provider.chain_id().await {
            Ok(chain_id) => chain_id,
            Err(err) => {
                return MintOutcome::Failed {
                    reason: format!("chain id query failed: {err:#}"),
                }
            }
        };

        let expected = self.config.required_chain_id;
        if actual != expected {
            warn!(expected = %expected, actual = %actual, "mint: wallet is on the wrong network");
            self.set_user_message(UserMessage::WrongNetwork {
                expected,
                actual,
                network_name: self.config.required_network_name.clone(),
            });
            return MintOutcome::WrongNetwork { expected, actual };
        }

        info!("mint: waiting for wallet to confirm transaction");
        let pending = match self.contract.submit_mint().await {
            Ok(pending) => pending,
            Err(err) if is_user_rejection(&err) => {
                return MintOutcome::Failed {
                    reason: "transaction rejected in wallet".to_string(),
                }
            }
            Err(err) => {
                return MintOutcome::Failed {
                    reason: format!("submission failed: {err:#}"),
                }
            }
        };

        info!(tx_hash = %pending.hash, "mint: mining transaction");
        let receipt = match self.contract.wait_for_confirmation(&pending).await {
            Ok(receipt) => receipt,
            Err(err) => {
                return MintOutcome::Failed {
                    reason: format!("transaction {} not confirmed: {err:#}", pending.hash),
                }
            }
        };

        let explorer_link = self.config.explorer_link(&receipt.hash).ok();
        match &explorer_link {
            Some(link) => info!(tx_hash = %receipt.hash, "mint: mined transaction {link}"),
            None => info!(tx_hash = %receipt.hash, "mint: mined transaction"),
        }
        MintOutcome::Confirmed {
            tx_hash: receipt.hash,
            explorer_link,
        }
    }

    /// Registers the mint-event listener unless one is already live.
    /// Returns whether a new listener was registered.
    pub async fn subscribe_to_mint_events(self: &Arc<Self>) -> bool {
        if self.provider.is_none() {
            warn!("mint events: provider not available; not subscribing");
            return false;
        }

        let mut slot = self.mint_listener.lock().await;
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("mint events: listener already registered");
            return false;
        }

        let mut events = self.contract.subscribe_mint_events();
        let sequencer: Weak<Self> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(sequencer) = sequencer.upgrade() else {
                            break;
                        };
                        sequencer.handle_mint_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "mint events: listener lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("mint events: listener stopped");
        }));
        info!("mint events: listener registered");
        true
    }

    pub async fn unsubscribe(&self) {
        if let Some(task) = self.mint_listener.lock().await.take() {
            task.abort();
            self.contract.unsubscribe_mint_events();
            info!("mint events: listener removed");
        }
    }

    pub async fn shutdown(&self) {
        self.unsubscribe().await;
    }

    async fn handle_mint_event(&self, event: MintEvent) {
        info!(
            sender = %event.sender,
            token_id = %event.token_id,
            "mint events: NewEpicNFTMinted"
        );
        let link = match self.config.asset_link(event.token_id) {
            Ok(link) => Some(link),
            Err(err) => {
                warn!(token_id = %event.token_id, "mint events: could not build asset link: {err}");
                None
            }
        };
        self.set_user_message(UserMessage::Minted {
            token_id: event.token_id,
            link,
        });
        self.refresh_supply().await;
    }

    pub async fn refresh_supply(&self) {
        if self.provider.is_none() {
            debug!("supply: provider not available; skipping refresh");
            return;
        }

        match self.contract.total_supply().await {
            Ok(minted) => {
                let ceiling = self.config.total_mint_count;
                info!(minted, ceiling, "supply: refreshed");
                self.session.send_modify(|state| {
                    state.supply = Some(SupplyProgress { minted, ceiling });
                });
            }
            Err(err) => warn!("supply: total supply query failed: {err:#}"),
        }
    }

    pub fn view_collection(&self) {
        if let Err(err) = self.link_opener.open(&self.config.collection_url) {
            warn!(url = %self.config.collection_url, "collection: could not open link: {err:#}");
        }
    }

    fn set_authorized_account(&self, account: AccountAddress) {
        self.session
            .send_modify(|state| state.authorized_account = Some(account));
    }

    fn set_user_message(&self, message: UserMessage) {
        self.session
            .send_modify(|state| state.user_message = Some(message));
    }
}

impl Drop for WalletSequencer {
    fn drop(&mut self) {
        if let Some(task) = self.mint_listener.get_mut().take() {
            task.abort();
            self.contract.unsubscribe_mint_events();
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
