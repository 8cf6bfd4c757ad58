//! Swarm orchestration with the tokio mpsc command pattern.
//!
//! The swarm event loop runs in a dedicated tokio task. [`SwarmBus`] talks
//! to it through typed commands; inbound GossipSub messages are routed
//! straight to the subscription queue registered for their topic.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{gossipsub, identify, swarm::SwarmEvent, Multiaddr, PeerId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use strand_shared::constants::DEFAULT_QUIC_PORT;

use crate::behaviour::StrandEvent;
use crate::bus::{BusMessage, PubSub, Subscription, SUBSCRIPTION_CAPACITY};
use crate::error::BusError;
use crate::transport::build_swarm;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Commands sent *into* the swarm task.
#[derive(Debug)]
pub enum SwarmCommand {
    /// Dial a remote peer at the given multiaddr.
    Dial(Multiaddr),
    /// Subscribe to a GossipSub topic and deliver its messages to `tx`.
    Subscribe {
        topic: String,
        tx: mpsc::Sender<BusMessage>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Leave a topic and drop its delivery queue.
    Unsubscribe(String),
    /// Publish a message on a GossipSub topic.
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Gracefully shut down the swarm.
    Shutdown,
}

/// Configuration for spawning the swarm.
pub struct SwarmConfig {
    /// UDP port for QUIC (defaults to `DEFAULT_QUIC_PORT`).
    pub listen_port: u16,
    /// Multiaddrs to dial on startup.
    pub dials: Vec<Multiaddr>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_QUIC_PORT,
            dials: Vec::new(),
        }
    }
}

/// Spawn the libp2p swarm in a background tokio task and return a
/// [`PubSub`] handle to it.
pub async fn spawn_swarm(keypair: libp2p::identity::Keypair, config: SwarmConfig) -> anyhow::Result<SwarmBus> {
    let mut swarm = build_swarm(keypair)?;
    let local_peer_id = *swarm.local_peer_id();

    // Listen on QUIC (IPv4 and IPv6)
    let listen_addr_v4: Multiaddr = format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.listen_port).parse()?;
    let listen_addr_v6: Multiaddr = format!("/ip6/::/udp/{}/quic-v1", config.listen_port).parse()?;

    swarm.listen_on(listen_addr_v4)?;
    if let Err(e) = swarm.listen_on(listen_addr_v6) {
        warn!(error = %e, "IPv6 listen failed, continuing with IPv4 only");
    }

    info!(peer_id = %local_peer_id, port = config.listen_port, "Swarm listening");

    for addr in &config.dials {
        if let Err(e) = swarm.dial(addr.clone()) {
            warn!(addr = %addr, error = %e, "Failed to dial peer");
        } else {
            debug!(addr = %addr, "Dialing peer");
        }
    }

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SwarmCommand>(256);

    tokio::spawn(async move {
        let mut routes: HashMap<gossipsub::TopicHash, mpsc::Sender<BusMessage>> = HashMap::new();

        loop {
            tokio::select! {
                // --- Incoming commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SwarmCommand::Dial(addr)) => {
                            if let Err(e) = swarm.dial(addr.clone()) {
                                error!(addr = %addr, error = %e, "Dial failed");
                            }
                        }
                        Some(SwarmCommand::Subscribe { topic, tx, reply }) => {
                            let gossipsub_topic = gossipsub::IdentTopic::new(&topic);
                            let result = swarm
                                .behaviour_mut()
                                .gossipsub
                                .subscribe(&gossipsub_topic)
                                .map(|_| ())
                                .map_err(|e| e.to_string());
                            if result.is_ok() {
                                routes.insert(gossipsub_topic.hash(), tx);
                                debug!(topic = %topic, "Subscribed");
                            }
                            let _ = reply.send(result);
                        }
                        Some(SwarmCommand::Unsubscribe(topic)) => {
                            let gossipsub_topic = gossipsub::IdentTopic::new(&topic);
                            routes.remove(&gossipsub_topic.hash());
                            swarm.behaviour_mut().gossipsub.unsubscribe(&gossipsub_topic);
                            debug!(topic = %topic, "Unsubscribed");
                        }
                        Some(SwarmCommand::Publish { topic, data, reply }) => {
                            let gossipsub_topic = gossipsub::IdentTopic::new(&topic);
                            let result = match swarm.behaviour_mut().gossipsub.publish(gossipsub_topic, data) {
                                Ok(_) => Ok(()),
                                // Nobody to tell yet; the periodic republish covers late joiners.
                                Err(gossipsub::PublishError::InsufficientPeers) => {
                                    debug!(topic = %topic, "No peers on topic, publish skipped");
                                    Ok(())
                                }
                                Err(e) => {
                                    error!(topic = %topic, error = %e, "Publish failed");
                                    Err(e.to_string())
                                }
                            };
                            let _ = reply.send(result);
                        }
                        Some(SwarmCommand::Shutdown) => {
                            info!("Swarm shutdown requested");
                            break;
                        }
                        None => {
                            info!("Command channel closed, shutting down swarm");
                            break;
                        }
                    }
                }

                // --- Swarm events ---
                event = swarm.select_next_some() => {
                    match event {
                        SwarmEvent::Behaviour(StrandEvent::Gossipsub(
                            gossipsub::Event::Message { message, .. },
                        )) => {
                            let Some(tx) = routes.get(&message.topic) else {
                                continue;
                            };
                            let from = message.source.map(|p| p.to_base58()).unwrap_or_default();
                            debug!(
                                topic = %message.topic,
                                source = %from,
                                len = message.data.len(),
                                "GossipSub message received"
                            );
                            let msg = BusMessage {
                                from,
                                topic: message.topic.to_string(),
                                data: message.data,
                            };
                            if tx.try_send(msg).is_err() {
                                warn!(topic = %message.topic, "Subscriber queue full or closed, message dropped");
                            }
                        }

                        SwarmEvent::Behaviour(StrandEvent::Identify(
                            identify::Event::Received { peer_id, info, .. },
                        )) => {
                            debug!(
                                peer = %peer_id,
                                protocol = ?info.protocol_version,
                                "Identify: received info from peer"
                            );
                        }

                        SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                            info!(
                                peer = %peer_id,
                                addr = %endpoint.get_remote_address(),
                                "Peer connected"
                            );
                        }

                        SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                            if num_established == 0 {
                                info!(peer = %peer_id, "Peer disconnected");
                            }
                        }

                        SwarmEvent::NewListenAddr { address, .. } => {
                            info!(addr = %address, "Listening on new address");
                        }

                        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                            warn!(peer = ?peer_id, error = %error, "Outgoing connection error");
                        }

                        SwarmEvent::IncomingConnectionError { error, .. } => {
                            warn!(error = %error, "Incoming connection error");
                        }

                        _ => {}
                    }
                }
            }
        }

        info!("Swarm event loop terminated");
    });

    Ok(SwarmBus {
        cmd_tx,
        local_peer_id: local_peer_id.to_base58(),
        peer_id: local_peer_id,
    })
}

/// [`PubSub`] handle onto a running swarm task.
#[derive(Debug, Clone)]
pub struct SwarmBus {
    cmd_tx: mpsc::Sender<SwarmCommand>,
    local_peer_id: String,
    peer_id: PeerId,
}

impl SwarmBus {
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub async fn dial(&self, addr: Multiaddr) -> Result<(), BusError> {
        self.send(SwarmCommand::Dial(addr)).await
    }

    pub async fn shutdown(&self) -> Result<(), BusError> {
        self.send(SwarmCommand::Shutdown).await
    }

    async fn send(&self, cmd: SwarmCommand) -> Result<(), BusError> {
        self.cmd_tx.send(cmd).await.map_err(|_| BusError::Closed)
    }
}

#[async_trait]
impl PubSub for SwarmBus {
    fn local_peer_id(&self) -> &str {
        &self.local_peer_id
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let (reply, done) = oneshot::channel();
        self.send(SwarmCommand::Subscribe {
            topic: topic.to_string(),
            tx,
            reply,
        })
        .await?;
        done.await
            .map_err(|_| BusError::Closed)?
            .map_err(|reason| BusError::Subscribe {
                topic: topic.to_string(),
                reason,
            })?;
        Ok(Subscription::new(topic.to_string(), rx))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        self.send(SwarmCommand::Unsubscribe(topic.to_string())).await
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), BusError> {
        let (reply, done) = oneshot::channel();
        self.send(SwarmCommand::Publish {
            topic: topic.to_string(),
            data,
            reply,
        })
        .await?;
        done.await
            .map_err(|_| BusError::Closed)?
            .map_err(|reason| BusError::Publish {
                topic: topic.to_string(),
                reason,
            })
    }
}
