use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use client_core::config::DEFAULT_POLL_INTERVAL;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: String,
    /// When false the session runs as if no wallet extension were installed.
    pub wallet_enabled: bool,
    pub poll_interval_ms: u64,
    pub confirmation_timeout_secs: Option<u64>,
    pub event_wait_secs: u64,
    pub launch_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            wallet_enabled: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            confirmation_timeout_secs: None,
            event_wait_secs: 120,
            launch_browser: true,
        }
    }
}

impl Settings {
    pub fn rpc_endpoint(&self) -> anyhow::Result<Url> {
        Url::parse(&self.rpc_url).with_context(|| format!("invalid rpc url '{}'", self.rpc_url))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }

    pub fn event_wait(&self) -> Duration {
        Duration::from_secs(self.event_wait_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    rpc_url: Option<String>,
    wallet_enabled: Option<bool>,
    poll_interval_ms: Option<u64>,
    confirmation_timeout_secs: Option<u64>,
    event_wait_secs: Option<u64>,
    launch_browser: Option<bool>,
}

pub fn load_settings(path: &Path) -> Settings {
    load_settings_with(path, |key| std::env::var(key).ok())
}

pub fn load_settings_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => tracing::warn!(path = %path.display(), "ignoring malformed settings file: {err}"),
        }
    }

    if let Some(v) = env("RPC_URL") {
        settings.rpc_url = v;
    }
    if let Some(v) = env("APP__RPC_URL") {
        settings.rpc_url = v;
    }

    if let Some(v) = env("APP__WALLET_ENABLED").and_then(|v| parse_bool(&v)) {
        settings.wallet_enabled = v;
    }

    if let Some(v) = env("APP__POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.poll_interval_ms = v;
    }

    if let Some(v) = env("APP__CONFIRMATION_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.confirmation_timeout_secs = Some(v);
    }

    if let Some(v) = env("APP__EVENT_WAIT_SECS").and_then(|v| v.parse().ok()) {
        settings.event_wait_secs = v;
    }

    if let Some(v) = env("APP__LAUNCH_BROWSER").and_then(|v| parse_bool(&v)) {
        settings.launch_browser = v;
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.rpc_url {
        settings.rpc_url = v;
    }
    if let Some(v) = file_cfg.wallet_enabled {
        settings.wallet_enabled = v;
    }
    if let Some(v) = file_cfg.poll_interval_ms {
        settings.poll_interval_ms = v;
    }
    if file_cfg.confirmation_timeout_secs.is_some() {
        settings.confirmation_timeout_secs = file_cfg.confirmation_timeout_secs;
    }
    if let Some(v) = file_cfg.event_wait_secs {
        settings.event_wait_secs = v;
    }
    if let Some(v) = file_cfg.launch_browser {
        settings.launch_browser = v;
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
