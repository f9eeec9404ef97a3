use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use leanda_core::LeandaClient;
use leanda_livesync::config::LivesyncConfig;
use leanda_livesync::sync::engine::SyncEngine;
use leanda_livesync::sync::local_watcher::{handle_event, start_notify_watcher};
use leanda_livesync::sync::resolve::resolve_remote_root;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "leanda-livesync",
    version,
    about = "Two-way sync between a local folder and a Leanda folder"
)]
struct Cli {
    /// Local folder to synchronize
    #[arg(short = 'l', long, default_value = ".")]
    local_folder: PathBuf,

    /// Remote folder: a node id, a path, or a unique name prefix
    #[arg(short = 'r', long, default_value = ".")]
    remote_folder: String,

    /// Compare local files more strictly (accepted, currently informational)
    #[arg(long, visible_alias = "ul")]
    update_local: bool,

    /// Compare remote files more strictly (accepted, currently informational)
    #[arg(long, visible_alias = "ur")]
    update_remote: bool,

    /// Keep running after the sync and report local changes
    #[arg(long)]
    watch: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = LivesyncConfig::from_env()?;
    let client = LeandaClient::with_base_url(
        &config.api_url,
        config.token.clone(),
        config.owner_id.clone(),
    )
    .context("failed to build the Leanda client")?;

    let settings = config.sync_settings();
    let remote_root = resolve_remote_root(
        &client,
        &config.session(),
        settings.page_size,
        &cli.remote_folder,
    )
    .await
    .with_context(|| format!("cannot resolve remote folder {:?}", cli.remote_folder))?;
    if cli.update_local || cli.update_remote {
        warn!(
            update_local = cli.update_local,
            update_remote = cli.update_remote,
            "update flags are accepted but do not change what gets transferred"
        );
    }

    let engine = SyncEngine::new(client, settings);
    engine
        .sync(&cli.local_folder, &remote_root)
        .await
        .with_context(|| format!("sync of {} failed", cli.local_folder.display()))?;

    if cli.watch {
        watch(&cli.local_folder).await?;
    }
    Ok(())
}

async fn watch(root: &std::path::Path) -> anyhow::Result<()> {
    let (_watcher, mut events) = start_notify_watcher(root)
        .with_context(|| format!("failed to watch {}", root.display()))?;
    info!(path = %root.display(), "watching for local changes, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("stopping watcher");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(event) => handle_event(&event),
                None => return Ok(()),
            },
        }
    }
}
