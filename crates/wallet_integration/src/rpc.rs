use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use shared::{
    domain::{format_quantity, parse_quantity, AccountAddress, ChainId, TxHash},
    error::ProviderException,
    protocol::{
        CallRequest, LogFilter, MintEvent, RpcLog, RpcReceipt, RpcRequest, RpcResponse,
        TransactionRequest,
    },
};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    abi, ContractClient, PendingTransaction, TransactionReceipt, WalletError, WalletProvider,
};

const MINT_EVENT_CHANNEL_CAPACITY: usize = 64;
const RECEIPT_SUCCESS_STATUS: &str = "0x1";

pub struct JsonRpcTransport {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<T, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let transport_err = |source| WalletError::Transport {
            method: method.to_string(),
            source,
        };
        let response: RpcResponse = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .map_err(transport_err)?
            .error_for_status()
            .map_err(transport_err)?
            .json()
            .await
            .map_err(transport_err)?;

        if let Some(response_id) = response.id.filter(|response_id| *response_id != id) {
            return Err(WalletError::Decode {
                method: method.to_string(),
                reason: format!("response id {response_id} does not match request id {id}"),
            });
        }

        if let Some(error) = response.error {
            let exception = ProviderException::from(error);
            if exception.code.is_user_rejection() {
                return Err(WalletError::UserRejected(exception.message));
            }
            return Err(WalletError::Rpc {
                method: method.to_string(),
                source: exception,
            });
        }

        debug!(method, id, "json-rpc call completed");
        serde_json::from_value(response.result.unwrap_or(serde_json::Value::Null)).map_err(
            |err| WalletError::Decode {
                method: method.to_string(),
                reason: err.to_string(),
            },
        )
    }

    async fn quantity(&self, method: &str, params: serde_json::Value) -> Result<u64> {
        let raw: String = self.request(method, params).await?;
        parse_quantity(&raw).map_err(|err| {
            WalletError::Decode {
                method: method.to_string(),
                reason: err.to_string(),
            }
            .into()
        })
    }
}

pub struct JsonRpcWallet {
    transport: Arc<JsonRpcTransport>,
}

impl JsonRpcWallet {
    pub fn new(transport: Arc<JsonRpcTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn accounts(&self) -> Result<Vec<AccountAddress>> {
        Ok(self.transport.request("eth_accounts", json!([])).await?)
    }

    async fn request_accounts(&self) -> Result<Vec<AccountAddress>> {
        Ok(self
            .transport
            .request("eth_requestAccounts", json!([]))
            .await?)
    }

    async fn chain_id(&self) -> Result<ChainId> {
        let raw: String = self.transport.request("eth_chainId", json!([])).await?;
        ChainId::from_quantity(&raw).map_err(|err| {
            WalletError::Decode {
                method: "eth_chainId".to_string(),
                reason: err.to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone)]
pub struct ContractOptions {
    pub address: String,
    pub poll_interval: Duration,
    /// Upper bound on the confirmation wait; `None` waits indefinitely.
    pub confirmation_timeout: Option<Duration>,
}

pub struct EpicNftContract {
    transport: Arc<JsonRpcTransport>,
    options: ContractOptions,
    events: broadcast::Sender<MintEvent>,
    log_poller: Mutex<Option<JoinHandle<()>>>,
}

impl EpicNftContract {
    pub fn new(transport: Arc<JsonRpcTransport>, options: ContractOptions) -> Self {
        let (events, _) = broadcast::channel(MINT_EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            options,
            events,
            log_poller: Mutex::new(None),
        }
    }

    async fn signer(&self) -> Result<AccountAddress> {
        let accounts: Vec<AccountAddress> =
            self.transport.request("eth_accounts", json!([])).await?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::NoAccounts.into())
    }

    fn ensure_log_poller(&self) {
        let mut slot = self
            .log_poller
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let transport = Arc::clone(&self.transport);
        let address = self.options.address.clone();
        let interval = self.options.poll_interval;
        let events = self.events.clone();
        *slot = Some(tokio::spawn(poll_mint_logs(
            transport, address, interval, events,
        )));
    }

    fn stop_log_poller(&self) {
        let mut slot = self
            .log_poller
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(task) = slot.take() {
            task.abort();
            info!(contract = %self.options.address, "mint log poller stopped");
        }
    }
}

impl Drop for EpicNftContract {
    fn drop(&mut self) {
        let slot = self
            .log_poller
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(task) = slot.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl ContractClient for EpicNftContract {
    async fn total_supply(&self) -> Result<u64> {
        let call = CallRequest {
            to: self.options.address.clone(),
            data: abi::encode_call(abi::TOTAL_SUPPLY_SIGNATURE),
        };
        let raw: String = self
            .transport
            .request("eth_call", json!([call, "latest"]))
            .await?;
        abi::decode_uint(&raw).map_err(|err| {
            WalletError::Decode {
                method: "eth_call".to_string(),
                reason: err.to_string(),
            }
            .into()
        })
    }

    async fn submit_mint(&self) -> Result<PendingTransaction> {
        let from = self.signer().await?;
        let tx = TransactionRequest {
            from,
            to: self.options.address.clone(),
            data: abi::encode_call(abi::MINT_SIGNATURE),
        };
        let hash: TxHash = self
            .transport
            .request("eth_sendTransaction", json!([tx]))
            .await?;
        info!(tx_hash = %hash, "mint transaction submitted");
        Ok(PendingTransaction { hash })
    }

    async fn wait_for_confirmation(
        &self,
        pending: &PendingTransaction,
    ) -> Result<TransactionReceipt> {
        let started = Instant::now();
        loop {
            let receipt: Option<RpcReceipt> = self
                .transport
                .request("eth_getTransactionReceipt", json!([pending.hash]))
                .await?;

            if let Some(receipt) = receipt {
                let status = receipt.status.as_deref();
                if status.is_some_and(|status| !status.eq_ignore_ascii_case(RECEIPT_SUCCESS_STATUS))
                {
                    return Err(WalletError::Reverted(receipt.transaction_hash).into());
                }
                let block_number = receipt
                    .block_number
                    .as_deref()
                    .and_then(|raw| parse_quantity(raw).ok());
                return Ok(TransactionReceipt {
                    hash: receipt.transaction_hash,
                    block_number,
                });
            }

            if let Some(limit) = self.options.confirmation_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    return Err(WalletError::ConfirmationTimeout {
                        hash: pending.hash.clone(),
                        waited,
                    }
                    .into());
                }
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    fn subscribe_mint_events(&self) -> broadcast::Receiver<MintEvent> {
        let receiver = self.events.subscribe();
        self.ensure_log_poller();
        receiver
    }

    fn unsubscribe_mint_events(&self) {
        self.stop_log_poller();
    }
}

async fn poll_mint_logs(
    transport: Arc<JsonRpcTransport>,
    address: String,
    interval: Duration,
    events: broadcast::Sender<MintEvent>,
) {
    let topic = abi::event_topic(abi::MINT_EVENT_SIGNATURE);
    let mut next_block: Option<u64> = None;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let head = match transport.quantity("eth_blockNumber", json!([])).await {
            Ok(head) => head,
            Err(err) => {
                warn!("mint log poller: block number query failed: {err:#}");
                continue;
            }
        };

        // First successful tick only anchors the cursor; history is not replayed.
        let Some(from) = next_block else {
            next_block = Some(head + 1);
            continue;
        };
        if head < from {
            continue;
        }

        let filter = LogFilter {
            address: address.clone(),
            topics: vec![topic.clone()],
            from_block: format_quantity(from),
            to_block: format_quantity(head),
        };
        let logs: Vec<RpcLog> = match transport.request("eth_getLogs", json!([filter])).await {
            Ok(logs) => logs,
            Err(err) => {
                warn!(from, head, "mint log poller: eth_getLogs failed: {err}");
                continue;
            }
        };

        for log in &logs {
            match abi::decode_mint_log(log) {
                Ok(event) => {
                    debug!(token_id = %event.token_id, sender = %event.sender, "mint log decoded");
                    if events.send(event).is_err() {
                        debug!("mint log poller: no receivers for decoded event");
                    }
                }
                Err(err) => warn!("mint log poller: skipping undecodable log: {err}"),
            }
        }
        next_block = Some(head + 1);
    }
}
