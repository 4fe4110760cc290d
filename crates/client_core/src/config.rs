use std::time::Duration;

use shared::domain::{ChainId, TokenId, TxHash};
use url::Url;

pub const REQUIRED_CHAIN_ID: ChainId = ChainId(0x4);
pub const REQUIRED_NETWORK_NAME: &str = "Rinkeby Test Network";
pub const CONTRACT_ADDRESS: &str = "0xf482d1e4ef91a00cEe82177CEA0A2eF58280840C";
pub const TOTAL_MINT_COUNT: u64 = 100;
pub const COLLECTION_URL: &str = "https://testnets.opensea.io/collection/dessert-nft-v4";
pub const ASSET_URL_BASE: &str = "https://testnets.opensea.io/assets";
pub const EXPLORER_TX_URL_BASE: &str = "https://rinkeby.etherscan.io/tx";
pub const SOCIAL_HANDLE: &str = "targetconfirmd";
pub const SOCIAL_PROFILE_URL: &str = "https://twitter.com/targetconfirmd";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerConfig {
    pub required_chain_id: ChainId,
    pub required_network_name: String,
    pub contract_address: String,
    pub total_mint_count: u64,
    pub collection_url: Url,
    pub asset_url_base: Url,
    pub explorer_tx_url_base: Url,
    pub social_handle: String,
    pub social_profile_url: Url,
}

impl SequencerConfig {
    pub fn builtin() -> Result<Self, url::ParseError> {
        Ok(Self {
            required_chain_id: REQUIRED_CHAIN_ID,
            required_network_name: REQUIRED_NETWORK_NAME.to_string(),
            contract_address: CONTRACT_ADDRESS.to_string(),
            total_mint_count: TOTAL_MINT_COUNT,
            collection_url: Url::parse(COLLECTION_URL)?,
            asset_url_base: Url::parse(ASSET_URL_BASE)?,
            explorer_tx_url_base: Url::parse(EXPLORER_TX_URL_BASE)?,
            social_handle: SOCIAL_HANDLE.to_string(),
            social_profile_url: Url::parse(SOCIAL_PROFILE_URL)?,
        })
    }

    pub fn asset_link(&self, token_id: TokenId) -> Result<Url, url::ParseError> {
        join_segments(
            &self.asset_url_base,
            &[self.contract_address.as_str(), &token_id.to_string()],
        )
    }

    pub fn explorer_link(&self, tx_hash: &TxHash) -> Result<Url, url::ParseError> {
        join_segments(&self.explorer_tx_url_base, &[tx_hash.0.as_str()])
    }
}

fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, url::ParseError> {
    let mut raw = base.as_str().trim_end_matches('/').to_string();
    for segment in segments {
        raw.push('/');
        raw.push_str(segment);
    }
    Url::parse(&raw)
}
