use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use client_core::LinkOpener;
use url::Url;

/// Prints the link and, when enabled, hands it to the platform browser launcher.
pub struct SystemLinkOpener {
    launch_browser: bool,
}

impl SystemLinkOpener {
    pub fn new(launch_browser: bool) -> Self {
        Self { launch_browser }
    }
}

impl LinkOpener for SystemLinkOpener {
    fn open(&self, url: &Url) -> Result<()> {
        println!("{url}");
        if !self.launch_browser {
            return Ok(());
        }

        let (program, args) = launcher_command(url);
        Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {program} for {url}"))?;
        Ok(())
    }
}

fn launcher_command(url: &Url) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "windows") {
        (
            "cmd",
            vec!["/C".into(), "start".into(), String::new(), url.to_string()],
        )
    } else if cfg!(target_os = "macos") {
        ("open", vec![url.to_string()])
    } else {
        ("xdg-open", vec![url.to_string()])
    }
}
