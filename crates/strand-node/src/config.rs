//! Node configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a node can start with zero
//! configuration for local use.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use strand_shared::constants::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_GATEWAY_PORT, DEFAULT_QUIC_PORT,
    DEFAULT_REPUBLISH_INTERVAL_SECS, DEFAULT_TOKEN_TTL_SECS,
};

/// Node configuration.
#[derive(Clone)]
pub struct NodeConfig {
    /// Repo root holding the database, blocks and node key.
    /// Env: `STRAND_DATA_DIR`
    /// Default: platform data directory.
    pub data_dir: PathBuf,

    /// Local read interface.
    /// Env: `STRAND_GATEWAY_ADDR`
    /// Default: `127.0.0.1:9999`
    pub gateway_addr: SocketAddr,

    /// Raw block endpoint peers fetch from. Disabled when unset.
    /// Env: `STRAND_BLOCKS_ADDR`
    pub blocks_addr: Option<SocketAddr>,

    /// UDP port for QUIC.
    /// Env: `STRAND_LISTEN_PORT`
    /// Default: `4001`
    pub listen_port: u16,

    /// Multiaddrs dialled on startup.
    /// Env: `STRAND_PEERS` (comma separated)
    pub peers: Vec<String>,

    /// Base URLs of peers' block endpoints.
    /// Env: `STRAND_BLOCK_PEERS` (comma separated)
    pub block_peers: Vec<String>,

    /// Upper bound on any remote fetch or pin.
    /// Env: `STRAND_FETCH_TIMEOUT_SECS`
    /// Default: 30s
    pub fetch_timeout: Duration,

    /// Env: `STRAND_REPUBLISH_INTERVAL_SECS`
    /// Default: 60s
    pub republish_interval: Duration,

    /// Gateway token lifetime.
    /// Env: `STRAND_TOKEN_TTL_SECS`
    /// Default: 300s
    pub token_ttl: Duration,

    /// Written into the metadata of locally added photos.
    /// Env: `STRAND_USERNAME`
    pub username: Option<String>,

    /// Bearer secret for the gateway control routes. A random one is
    /// generated at startup when unset.
    /// Env: `STRAND_GATEWAY_PASSWORD`
    pub gateway_password: Option<String>,
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("data_dir", &self.data_dir)
            .field("gateway_addr", &self.gateway_addr)
            .field("blocks_addr", &self.blocks_addr)
            .field("listen_port", &self.listen_port)
            .field("peers", &self.peers)
            .field("block_peers", &self.block_peers)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("republish_interval", &self.republish_interval)
            .field("token_ttl", &self.token_ttl)
            .field("username", &self.username)
            .field("gateway_password", &self.gateway_password.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: strand_store::database::default_data_dir()
                .unwrap_or_else(|_| PathBuf::from("./strand-data")),
            gateway_addr: ([127, 0, 0, 1], DEFAULT_GATEWAY_PORT).into(),
            blocks_addr: None,
            listen_port: DEFAULT_QUIC_PORT,
            peers: Vec::new(),
            block_peers: Vec::new(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            republish_interval: Duration::from_secs(DEFAULT_REPUBLISH_INTERVAL_SECS),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            username: None,
            gateway_password: None,
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = var("STRAND_DATA_DIR") {
            config.data_dir = PathBuf::from(path);
        }

        if let Some(addr) = var("STRAND_GATEWAY_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.gateway_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid STRAND_GATEWAY_ADDR, using default"),
            }
        }

        if let Some(addr) = var("STRAND_BLOCKS_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.blocks_addr = Some(parsed),
                Err(_) => tracing::warn!(value = %addr, "Invalid STRAND_BLOCKS_ADDR, block endpoint disabled"),
            }
        }

        if let Some(port) = var("STRAND_LISTEN_PORT").and_then(|v| v.parse().ok()) {
            config.listen_port = port;
        }

        if let Some(list) = var("STRAND_PEERS") {
            config.peers = split_list(&list);
        }

        if let Some(list) = var("STRAND_BLOCK_PEERS") {
            config.block_peers = split_list(&list);
        }

        if let Some(secs) = var("STRAND_FETCH_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.fetch_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = var("STRAND_REPUBLISH_INTERVAL_SECS").and_then(|v| v.parse::<u64>().ok()) {
            // tokio intervals panic on zero.
            config.republish_interval = Duration::from_secs(secs.max(1));
        }

        if let Some(secs) = var("STRAND_TOKEN_TTL_SECS").and_then(|v| v.parse().ok()) {
            config.token_ttl = Duration::from_secs(secs);
        }

        if let Some(name) = var("STRAND_USERNAME").filter(|v| !v.is_empty()) {
            config.username = Some(name);
        }

        if let Some(password) = var("STRAND_GATEWAY_PASSWORD").filter(|v| !v.is_empty()) {
            config.gateway_password = Some(password);
        }

        config
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
