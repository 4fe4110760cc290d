use std::time::Duration;

use async_trait::async_trait;
use shared::{
    domain::{AccountAddress, ChainId, TxHash},
    error::ProviderException,
    protocol::MintEvent,
};
use thiserror::Error;
use tokio::sync::broadcast;

pub mod abi;
pub mod rpc;

pub use rpc::{ContractOptions, EpicNftContract, JsonRpcTransport, JsonRpcWallet};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("user rejected the request: {0}")]
    UserRejected(String),
    #[error("wallet has no authorized accounts")]
    NoAccounts,
    #[error("json-rpc method {method} failed: {source}")]
    Rpc {
        method: String,
        #[source]
        source: ProviderException,
    },
    #[error("transport failure calling {method}: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("malformed {method} response: {reason}")]
    Decode { method: String, reason: String },
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
    #[error("transaction {hash} not confirmed after {waited:?}")]
    ConfirmationTimeout { hash: TxHash, waited: Duration },
}

impl WalletError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::UserRejected(_))
    }
}

/// True when the error chain carries a wallet-side user rejection.
pub fn is_user_rejection(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<WalletError>()
            .is_some_and(WalletError::is_user_rejection)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub hash: TxHash,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts already granted to this origin; never prompts.
    async fn accounts(&self) -> anyhow::Result<Vec<AccountAddress>>;
    async fn request_accounts(&self) -> anyhow::Result<Vec<AccountAddress>>;
    async fn chain_id(&self) -> anyhow::Result<ChainId>;
}

#[async_trait]
pub trait ContractClient: Send + Sync {
    async fn total_supply(&self) -> anyhow::Result<u64>;
    async fn submit_mint(&self) -> anyhow::Result<PendingTransaction>;
    async fn wait_for_confirmation(
        &self,
        pending: &PendingTransaction,
    ) -> anyhow::Result<TransactionReceipt>;
    fn subscribe_mint_events(&self) -> broadcast::Receiver<MintEvent>;
    /// Stops whatever feeds the receivers handed out by `subscribe_mint_events`.
    fn unsubscribe_mint_events(&self);
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
