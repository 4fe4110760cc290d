use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EIP-1193 provider error codes plus the JSON-RPC codes wallets commonly return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    UserRejected,
    Unauthorized,
    UnsupportedMethod,
    Disconnected,
    ChainDisconnected,
    MethodNotFound,
    InvalidParams,
    Internal,
    Other(i64),
}

impl ProviderErrorCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            4001 => Self::UserRejected,
            4100 => Self::Unauthorized,
            4200 => Self::UnsupportedMethod,
            4900 => Self::Disconnected,
            4901 => Self::ChainDisconnected,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::Internal,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::UserRejected => 4001,
            Self::Unauthorized => 4100,
            Self::UnsupportedMethod => 4200,
            Self::Disconnected => 4900,
            Self::ChainDisconnected => 4901,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
            Self::Other(code) => code,
        }
    }

    pub fn is_user_rejection(self) -> bool {
        matches!(self, Self::UserRejected | Self::Unauthorized)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcErrorObject {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Error)]
#[error("provider error {code:?} ({}): {message}", .code.code())]
pub struct ProviderException {
    pub code: ProviderErrorCode,
    pub message: String,
}

impl From<RpcErrorObject> for ProviderException {
    fn from(value: RpcErrorObject) -> Self {
        Self {
            code: ProviderErrorCode::from_code(value.code),
            message: value.message,
        }
    }
}
