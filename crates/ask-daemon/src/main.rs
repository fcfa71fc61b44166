//! # Askd
//!
//! Daemon entry point: load configuration, open the repo, compose the node
//! options, assemble, and serve the extracted API over JSON-RPC until a
//! shutdown signal arrives.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ask_daemon::api::new_api_slot;
use ask_daemon::builder::{ask_api, config, new_node, online, repo};
use ask_daemon::config::NodeConfig;
use ask_daemon::repo::{FsRepo, RepoError};
use ask_daemon::rpc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load and validate configuration
    let node_config = NodeConfig::from_env();
    node_config.validate().context("invalid configuration")?;

    // Open (or create) the repo
    let fs_repo = FsRepo::new(&node_config.repo.path);
    match fs_repo.init() {
        Ok(()) => {}
        Err(RepoError::AlreadyInitialized { .. }) => {
            info!(path = %node_config.repo.path.display(), "using existing repo");
        }
        Err(err) => return Err(err).context("initializing repo"),
    }

    // Compose and assemble the node
    let api_slot = new_api_slot();
    let stop = new_node([
        ask_api(api_slot.clone()),
        repo(fs_repo),
        online(),
        config(node_config.clone()),
    ])
    .await
    .context("assembling node")?;

    let api = api_slot
        .get()
        .cloned()
        .context("api was not extracted during startup")?;

    // Expose the API
    let rpc_server = if node_config.rpc.enabled {
        let server = rpc::serve(&node_config.rpc.listen_addr, api)
            .await
            .context("starting rpc server")?;
        Some(server)
    } else {
        None
    };

    info!("node is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    // Graceful shutdown: RPC first, then the assembled node
    info!("shutting down");
    if let Some(server) = rpc_server {
        server.stop();
    }
    stop.stop().await.context("stopping node")?;

    Ok(())
}
