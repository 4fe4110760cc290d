use sha3::{Digest, Keccak256};
use shared::{
    domain::{word_to_u64, AccountAddress, TokenId},
    protocol::{MintEvent, RpcLog},
};
use thiserror::Error;

pub const TOTAL_SUPPLY_SIGNATURE: &str = "totalSupply()";
pub const MINT_SIGNATURE: &str = "makeAnEpicNFT()";
pub const MINT_EVENT_SIGNATURE: &str = "NewEpicNFTMinted(address,uint256)";

const WORD_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),
    #[error("log topic {0} is not a mint event")]
    UnexpectedTopic(String),
    #[error("payload has {actual} bytes, expected {expected}")]
    PayloadLength { actual: usize, expected: usize },
    #[error("mint event field out of range: {0}")]
    Field(String),
}

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    Keccak256::digest(bytes).into()
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

pub fn encode_call(signature: &str) -> String {
    format!("0x{}", hex::encode(selector(signature)))
}

pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

pub fn decode_hex(raw: &str) -> Result<Vec<u8>, AbiError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|_| AbiError::InvalidHex(raw.to_string()))
}

pub fn decode_uint(raw: &str) -> Result<u64, AbiError> {
    let bytes = decode_hex(raw)?;
    if bytes.len() < WORD_LEN {
        return Err(AbiError::PayloadLength {
            actual: bytes.len(),
            expected: WORD_LEN,
        });
    }
    word_to_u64(&bytes[..WORD_LEN]).map_err(|err| AbiError::Field(err.to_string()))
}

/// Decodes a `NewEpicNFTMinted` log. Accepts the deployed layout with both fields in
/// `data`, sender indexed with the token id in `data`, and both fields indexed.
pub fn decode_mint_log(log: &RpcLog) -> Result<MintEvent, AbiError> {
    let expected = event_topic(MINT_EVENT_SIGNATURE);
    let Some(topic0) = log.topics.first() else {
        return Err(AbiError::UnexpectedTopic(String::new()));
    };
    if !topic0.eq_ignore_ascii_case(&expected) {
        return Err(AbiError::UnexpectedTopic(topic0.clone()));
    }

    let (sender_word, token_word) = match log.topics.len() {
        1 => {
            let data = data_words(&log.data, 2)?;
            (data[..WORD_LEN].to_vec(), data[WORD_LEN..].to_vec())
        }
        2 => (decode_hex(&log.topics[1])?, data_words(&log.data, 1)?),
        _ => (decode_hex(&log.topics[1])?, decode_hex(&log.topics[2])?),
    };

    let sender =
        AccountAddress::from_word(&sender_word).map_err(|err| AbiError::Field(err.to_string()))?;
    let token_id = word_to_u64(&token_word).map_err(|err| AbiError::Field(err.to_string()))?;
    Ok(MintEvent {
        sender,
        token_id: TokenId(token_id),
    })
}

fn data_words(raw: &str, words: usize) -> Result<Vec<u8>, AbiError> {
    let data = decode_hex(raw)?;
    if data.len() != words * WORD_LEN {
        return Err(AbiError::PayloadLength {
            actual: data.len(),
            expected: words * WORD_LEN,
        });
    }
    Ok(data)
}

pub fn encode_uint_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}
