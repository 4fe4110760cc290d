use client_core::{SequencerConfig, SessionState};
use tokio::{sync::watch, task::JoinHandle};

const TITLE: &str = "My NFT Collection";
const TAGLINE: &str = "Each unique. Each beautiful. Discover your NFT today.";

pub struct Renderer {
    social_handle: String,
    social_profile_url: String,
}

impl Renderer {
    pub fn new(config: &SequencerConfig) -> Self {
        Self {
            social_handle: config.social_handle.clone(),
            social_profile_url: config.social_profile_url.to_string(),
        }
    }

    pub fn render(&self, state: &SessionState) -> String {
        let mut lines = vec![TITLE.to_string(), TAGLINE.to_string(), String::new()];

        match &state.authorized_account {
            Some(account) => {
                lines.push(format!("Wallet: {account}"));
                lines.push("Actions: mint, view-collection".to_string());
            }
            None => lines.push("Wallet: not connected (run `minter connect`)".to_string()),
        }
        if state.mint_in_progress {
            lines.push("Minting NFT...".to_string());
        }
        if let Some(message) = &state.user_message {
            lines.push(message.to_string());
        }
        if let Some(supply) = &state.supply {
            lines.push(supply.to_string());
        }

        lines.push(String::new());
        lines.push(format!(
            "built by @{} ({})",
            self.social_handle, self.social_profile_url
        ));
        lines.join("\n")
    }

    /// Prints every state change until the session sender goes away.
    pub fn spawn_follow(self, mut session: watch::Receiver<SessionState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while session.changed().await.is_ok() {
                let state = session.borrow_and_update().clone();
                println!("{}\n", self.render(&state));
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
