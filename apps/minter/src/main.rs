use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{MintOutcome, SequencerConfig, UserMessage, WalletSequencer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wallet_integration::{
    ContractOptions, EpicNftContract, JsonRpcTransport, JsonRpcWallet, WalletProvider,
};

mod config;
mod links;
mod render;

use config::load_settings;
use links::SystemLinkOpener;
use render::Renderer;

#[derive(Parser, Debug)]
#[command(about = "Mint an NFT from the collection through a JSON-RPC wallet")]
struct Args {
    #[arg(long, default_value = "minter.toml")]
    config: PathBuf,
    /// Overrides the wallet/node JSON-RPC endpoint from the settings file.
    #[arg(long)]
    rpc_url: Option<String>,
    /// Run as if no wallet were installed.
    #[arg(long)]
    no_wallet: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Show the current session.
    Status,
    /// Ask the wallet to authorize an account.
    Connect,
    /// Mint one NFT and wait for the mint event.
    Mint,
    /// Follow session changes until interrupted.
    Watch,
    /// Open the marketplace collection page.
    ViewCollection,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    if let Some(rpc_url) = args.rpc_url {
        settings.rpc_url = rpc_url;
    }
    if args.no_wallet {
        settings.wallet_enabled = false;
    }

    let config = SequencerConfig::builtin()?;
    let transport = Arc::new(JsonRpcTransport::new(settings.rpc_endpoint()?));
    let provider: Option<Arc<dyn WalletProvider>> = settings
        .wallet_enabled
        .then(|| Arc::new(JsonRpcWallet::new(Arc::clone(&transport))) as Arc<dyn WalletProvider>);
    let contract = EpicNftContract::new(
        transport,
        ContractOptions {
            address: config.contract_address.clone(),
            poll_interval: settings.poll_interval(),
            confirmation_timeout: settings.confirmation_timeout(),
        },
    );
    let sequencer = WalletSequencer::new_with_dependencies(
        provider,
        Arc::new(contract),
        Arc::new(SystemLinkOpener::new(settings.launch_browser)),
        config,
    );
    let renderer = Renderer::new(sequencer.config());

    sequencer.detect_existing_authorization().await;

    match args.command.unwrap_or(Command::Status) {
        Command::Status => {}
        Command::Connect => {
            sequencer.connect().await;
        }
        Command::Mint => mint_and_wait(&sequencer, settings.event_wait()).await,
        Command::Watch => {
            println!("{}\n", renderer.render(&sequencer.snapshot()));
            let follower = renderer.spawn_follow(sequencer.watch_session());
            tokio::signal::ctrl_c().await?;
            follower.abort();
            sequencer.shutdown().await;
            return Ok(());
        }
        Command::ViewCollection => sequencer.view_collection(),
    }

    println!("{}", renderer.render(&sequencer.snapshot()));
    sequencer.shutdown().await;
    Ok(())
}

async fn mint_and_wait(sequencer: &Arc<WalletSequencer>, event_wait: std::time::Duration) {
    if !sequencer.snapshot().is_connected() && sequencer.connect().await.is_none() {
        return;
    }

    let outcome = sequencer.mint().await;
    println!("{outcome}");
    if !matches!(outcome, MintOutcome::Confirmed { .. }) {
        return;
    }

    let mut session = sequencer.watch_session();
    let minted = tokio::time::timeout(
        event_wait,
        session.wait_for(|state| matches!(state.user_message, Some(UserMessage::Minted { .. }))),
    )
    .await;
    match minted {
        Ok(Ok(_)) => info!("mint: event received"),
        Ok(Err(_)) => warn!("mint: session closed before the mint event arrived"),
        Err(_) => warn!(
            waited_secs = event_wait.as_secs(),
            "mint: no mint event yet; run `minter watch` to keep following"
        ),
    }
}
