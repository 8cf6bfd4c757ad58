// Publish/subscribe transport for thread announcements: an in-process bus
// and a libp2p GossipSub swarm over QUIC behind the same trait.

pub mod behaviour;
pub mod bus;
pub mod error;
pub mod memory;
pub mod swarm;
pub mod transport;

pub use behaviour::{StrandBehaviour, StrandEvent};
pub use bus::{BusMessage, PubSub, Subscription};
pub use error::BusError;
pub use memory::{MemoryBus, MemoryHub};
pub use swarm::{spawn_swarm, SwarmBus, SwarmCommand, SwarmConfig};
pub use transport::build_swarm;
