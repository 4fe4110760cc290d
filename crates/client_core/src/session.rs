use std::fmt;

use shared::domain::{AccountAddress, ChainId, TokenId};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerAction {
    Connect,
    Mint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMessage {
    Minted {
        token_id: TokenId,
        link: Option<Url>,
    },
    WrongNetwork {
        expected: ChainId,
        actual: ChainId,
        network_name: String,
    },
    ActionFailed {
        action: SequencerAction,
    },
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minted {
                token_id,
                link: Some(link),
            } => write!(f, "Minted token #{token_id} on OpenSea successfully: {link}"),
            Self::Minted {
                token_id,
                link: None,
            } => write!(f, "Minted token #{token_id} successfully."),
            Self::WrongNetwork { network_name, .. } => {
                write!(f, "You are not connected to the {network_name}.")
            }
            Self::ActionFailed {
                action: SequencerAction::Connect,
            } => f.write_str("Could not connect to your wallet. Please try again."),
            Self::ActionFailed {
                action: SequencerAction::Mint,
            } => f.write_str("Minting did not complete. Please try again."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyProgress {
    pub minted: u64,
    pub ceiling: u64,
}

impl fmt::Display for SupplyProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "There has been {} of {} NFTs minted so far.",
            self.minted, self.ceiling
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub authorized_account: Option<AccountAddress>,
    pub mint_in_progress: bool,
    pub user_message: Option<UserMessage>,
    pub supply: Option<SupplyProgress>,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        self.authorized_account.is_some()
    }
}
