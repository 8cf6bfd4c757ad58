//! Composed libp2p `NetworkBehaviour` for Strand nodes.
//!
//! GossipSub carries thread announcements; Identify lets peers learn each
//! other's listen addresses and protocol version.

use libp2p::{gossipsub, identify, swarm::NetworkBehaviour};

/// Construction is handled by [`super::transport::build_swarm`].
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "StrandEvent")]
pub struct StrandBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub identify: identify::Behaviour,
}

/// Events emitted by the composed behaviour, one variant per sub-behaviour.
#[derive(Debug)]
pub enum StrandEvent {
    Gossipsub(gossipsub::Event),
    Identify(identify::Event),
}

impl From<gossipsub::Event> for StrandEvent {
    fn from(event: gossipsub::Event) -> Self {
        StrandEvent::Gossipsub(event)
    }
}

impl From<identify::Event> for StrandEvent {
    fn from(event: identify::Event) -> Self {
        StrandEvent::Identify(event)
    }
}
