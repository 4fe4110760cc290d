use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("hex quantity must start with 0x: {0:?}")]
    MissingPrefix(String),
    #[error("hex quantity is empty")]
    Empty,
    #[error("invalid hex quantity {0:?}")]
    Invalid(String),
    #[error("hex quantity {0:?} does not fit in 64 bits")]
    Overflow(String),
    #[error("expected a 32-byte ABI word, got {0} bytes")]
    WordLength(usize),
}

pub fn parse_quantity(raw: &str) -> Result<u64, QuantityError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| QuantityError::MissingPrefix(raw.to_string()))?;
    if digits.is_empty() {
        return Err(QuantityError::Empty);
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 16 {
        return Err(QuantityError::Overflow(raw.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| QuantityError::Invalid(raw.to_string()))
}

pub fn format_quantity(value: u64) -> String {
    format!("{value:#x}")
}

/// Reads an unsigned ABI word, rejecting values wider than 64 bits.
pub fn word_to_u64(word: &[u8]) -> Result<u64, QuantityError> {
    if word.len() != 32 {
        return Err(QuantityError::WordLength(word.len()));
    }
    if word[..24].iter().any(|byte| *byte != 0) {
        return Err(QuantityError::Overflow(format!("0x{}", hex::encode(word))));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(tail))
}

/// Wallet address as handed out by the wallet provider.
///
/// The provider is the authority on address formatting, so the string is kept
/// verbatim; comparisons are case-insensitive to tolerate checksummed input.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountAddress(String);

impl AccountAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into().trim().to_string())
    }

    pub fn from_word(word: &[u8]) -> Result<Self, QuantityError> {
        if word.len() != 32 {
            return Err(QuantityError::WordLength(word.len()));
        }
        Ok(Self(format!("0x{}", hex::encode(&word[12..]))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for AccountAddress {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
    pub fn from_quantity(raw: &str) -> Result<Self, QuantityError> {
        parse_quantity(raw).map(Self)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
