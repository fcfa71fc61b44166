//! # Node Configuration
//!
//! Unified configuration for the daemon: networking, RPC surface, and repo
//! location. Every field has a sane default and can be overridden through
//! `ASKD_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Network configuration.
    pub network: NetworkConfig,
    /// JSON-RPC configuration.
    pub rpc: RpcConfig,
    /// Repo configuration.
    pub repo: RepoConfig,
}

impl NodeConfig {
    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("ASKD_REPO_PATH") {
            config.repo.path = PathBuf::from(path);
        }
        if let Ok(addr) = std::env::var("ASKD_RPC_ADDR") {
            config.rpc.listen_addr = addr;
        }
        if let Ok(enabled) = std::env::var("ASKD_RPC_ENABLED") {
            config.rpc.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
        if let Ok(addr) = std::env::var("ASKD_LISTEN_ADDR") {
            config.network.listen_addr = addr;
        }
        if let Ok(peers) = std::env::var("ASKD_BOOTSTRAP_PEERS") {
            config.network.bootstrap_peers = peers
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(raw) = std::env::var("ASKD_MAX_PEERS") {
            match raw.parse() {
                Ok(max) => config.network.max_peers = max,
                Err(_) => warn!(value = %raw, "ASKD_MAX_PEERS is not a number, keeping default"),
            }
        }
        if let Ok(raw) = std::env::var("ASKD_MAINTENANCE_INTERVAL_MS") {
            match raw.parse() {
                Ok(interval) => config.network.maintenance_interval_ms = interval,
                Err(_) => {
                    warn!(value = %raw, "ASKD_MAINTENANCE_INTERVAL_MS is not a number, keeping default");
                }
            }
        }

        config
    }

    /// Validate the configuration before assembling a node.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.max_peers == 0 {
            return Err(ConfigError::ZeroMaxPeers);
        }
        if self.rpc.enabled {
            self.rpc
                .listen_addr
                .parse::<SocketAddr>()
                .map_err(|source| ConfigError::InvalidRpcAddr {
                    addr: self.rpc.listen_addr.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `max_peers` must allow at least one connection.
    #[error("network.max_peers must be at least 1")]
    ZeroMaxPeers,

    /// The RPC listen address does not parse as a socket address.
    #[error("rpc.listen_addr `{addr}` is not a valid socket address")]
    InvalidRpcAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// Network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Address this node announces for itself.
    pub listen_addr: String,
    /// Bootstrap node addresses to connect to on startup.
    pub bootstrap_peers: Vec<String>,
    /// Maximum peers the manager keeps connected.
    pub max_peers: usize,
    /// Peer maintenance loop interval in milliseconds.
    pub maintenance_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "mem://local".to_string(),
            bootstrap_peers: Vec::new(),
            max_peers: 16,
            maintenance_interval_ms: 5_000,
        }
    }
}

/// JSON-RPC configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Whether to expose the API over JSON-RPC.
    pub enabled: bool,
    /// HTTP listen address.
    pub listen_addr: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9301".to_string(),
        }
    }
}

/// Repo configuration.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// Directory holding the keystore and lock file.
    pub path: PathBuf,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./.askd"),
        }
    }
}
