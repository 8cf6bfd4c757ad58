//! # strand-node
//!
//! Runs a single Strand peer:
//! - **libp2p swarm** (QUIC + GossipSub) carrying thread head announcements
//! - **update sync** walking announced chains into the local registry
//! - **republisher** re-announcing local heads for late joiners
//! - **gateway** (axum) serving decrypted content behind per-content tokens
//! - **block endpoint** (optional) letting peers fetch raw encrypted blocks

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use libp2p::Multiaddr;
use rand::RngCore;
use strand_net::{spawn_swarm, SwarmConfig};
use strand_shared::constants::APP_NAME;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strand_node::gateway::{self, GatewayAuth, GatewayState};
use strand_node::{load_or_create_node_identity, spawn_republisher, Node, NodeConfig};

const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,strand_node=debug,strand_net=debug")),
        )
        .init();

    info!("Starting {} node v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Networking
    // -----------------------------------------------------------------------
    let identity = load_or_create_node_identity(&config.data_dir)?;
    let keypair = identity.to_libp2p_keypair()?;

    let dials = config
        .peers
        .iter()
        .filter_map(|p| match p.parse::<Multiaddr>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!(peer = %p, error = %e, "Ignoring unparseable peer address");
                None
            }
        })
        .collect();

    let swarm = spawn_swarm(
        keypair,
        SwarmConfig {
            listen_port: config.listen_port,
            dials,
        },
    )
    .await?;

    // -----------------------------------------------------------------------
    // 4. Node and background tasks
    // -----------------------------------------------------------------------
    let node = Arc::new(Node::open(&config, Arc::new(swarm.clone())).await?);
    info!(peer_id = %node.peer_id(), "Node ready");

    node.join_all().await?;
    let republisher = spawn_republisher(node.clone(), config.republish_interval);

    let auth = GatewayAuth::new(config.token_ttl);
    let purge = auth.clone();
    let shutdown = node.shutdown_token();
    let purge_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TOKEN_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = purge_shutdown.cancelled() => break,
                _ = interval.tick() => purge.purge_expired().await,
            }
        }
    });

    let password = match &config.gateway_password {
        Some(p) => p.clone(),
        None => {
            let mut bytes = [0u8; 24];
            rand::thread_rng().fill_bytes(&mut bytes);
            let generated = URL_SAFE_NO_PAD.encode(bytes);
            info!(password = %generated, "Generated gateway password");
            generated
        }
    };

    if let Some(addr) = config.blocks_addr {
        let node = node.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway::serve_blocks(node, addr, shutdown).await {
                tracing::error!(error = %e, "Block endpoint failed");
            }
        });
    }

    let state = GatewayState {
        node: node.clone(),
        auth,
        password: Arc::from(password),
    };

    // -----------------------------------------------------------------------
    // 5. Run the gateway until it fails or a shutdown signal arrives
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = gateway::serve(state, config.gateway_addr, shutdown.clone()) => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "Gateway failed");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    node.shutdown().await;
    let _ = republisher.await;
    if let Err(e) = swarm.shutdown().await {
        warn!(error = %e, "Swarm already stopped");
    }

    result
}
