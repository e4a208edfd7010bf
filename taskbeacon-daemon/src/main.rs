//! # taskbeacon-daemon
//!
//! The taskbeacon host daemon.
//!
//! This daemon is responsible for:
//! - Running config flows that authorize Microsoft To Do access
//! - Setting up and unloading config entries
//! - Polling the important-tasks sensor of every loaded entry
//! - Exposing flows, entries and sensors over JSON-RPC
//! - Receiving OAuth redirects on the callback view
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    taskbeacon-daemon                      │
//! │                                                           │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────┐   │
//! │  │ FlowManager │─▶│ EntryManager │─▶│ MsTodoPlatform  │   │
//! │  └─────────────┘  └──────┬───────┘  └─────────────────┘   │
//! │         ▲                ▼                                │
//! │         │          ┌──────────┐                           │
//! │         │          │  Poller  │                           │
//! │         │          └──────────┘                           │
//! │  ┌──────┴───────────────────────┐  ┌──────────────────┐   │
//! │  │     JSON-RPC API (TCP)        │  │  Callback view   │   │
//! │  └──────────────────────────────┘  └──────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! The daemon reads `$XDG_CONFIG_HOME/taskbeacon/config.toml`, or the file
//! given with `--config <path>`.
//!
//! ## Running
//!
//! ```bash
//! cargo run --bin taskbeacon-daemon
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin taskbeacon-daemon -- --config ./config.toml
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use taskbeacon_core::{EntryStore, MemoryEntryStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskbeacon_daemon::api;
use taskbeacon_daemon::config::Config;
use taskbeacon_daemon::flow::FlowManager;
use taskbeacon_daemon::manager::EntryManager;
use taskbeacon_daemon::platform::MsTodoPlatform;

/// Microsoft To Do important-tasks daemon.
#[derive(Debug, Parser)]
#[command(name = "taskbeacon-daemon")]
#[command(about = "Polls Microsoft To Do for open, high-importance tasks")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config_path, created_default) = match args.config {
        Some(path) => (path, false),
        None => {
            let path = Config::default_config_path()?;
            let created = Config::ensure_default_file(&path)?;
            (path, created)
        }
    };
    let config = Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting taskbeacon-daemon v{}", env!("CARGO_PKG_VERSION"));
    if created_default {
        info!(
            "Created default configuration file at: {}",
            config_path.display()
        );
    }
    info!("Using configuration file: {}", config_path.display());

    let store: Arc<dyn EntryStore> = Arc::new(MemoryEntryStore::new());
    let oauth = config.oauth.oauth_config();
    let platform = MsTodoPlatform::new(
        Arc::clone(&store),
        oauth.clone(),
        config.graph.base_url.clone(),
    );
    let manager = Arc::new(EntryManager::new(store, Arc::new(platform)));

    for entry in config.configured_entries() {
        let entry_id = entry.entry_id.clone();
        match manager.add_entry(entry).await {
            Ok(_) => info!("Imported config entry '{}'", entry_id),
            Err(e) => warn!("Failed to import config entry '{}': {:#}", entry_id, e),
        }
    }

    let flows = Arc::new(FlowManager::new(Arc::clone(&manager), oauth));

    let (server_handle, addr) =
        api::start_server(&config.daemon.bind_address, Arc::clone(&flows)).await?;
    let callback_server =
        api::start_callback_server(&config.daemon.callback_address, Arc::clone(&flows)).await?;

    info!("Daemon startup complete");
    info!("JSON-RPC API listening on: {}", addr);
    info!("Callback view listening on: {}", callback_server.local_addr());
    info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");

    manager.shutdown().await;
    callback_server.stop().await;
    server_handle.stop()?;

    info!("Daemon stopped");
    Ok(())
}
