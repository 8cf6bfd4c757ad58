//! Periodic re-announcement of every thread's local head, so peers that
//! missed a publish catch up on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::node::Node;

/// Spawn the republish loop. It fires once immediately, then every
/// `interval`, and exits when the node shuts down.
pub fn spawn_republisher(node: Arc<Node>, interval: Duration) -> JoinHandle<()> {
    let shutdown = node.shutdown_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match node.republish_latest_updates().await {
                        Ok(count) => debug!(count, "Republished thread heads"),
                        Err(e) => warn!(error = %e, "Republish pass failed"),
                    }
                }
            }
        }
        info!("Republisher stopped");
    })
}
