//! # strand-node
//!
//! A Strand peer: threads of encrypted photo bundles, each thread a chain of
//! updates linked by back-pointers, synchronised over pub/sub announcements
//! and a content-addressed object store.
//!
//! - [`Node`] publishes, shares and reads updates
//! - [`UpdateSync`] follows joined threads and walks announced chains
//! - [`gateway`] serves decrypted content to local clients over HTTP

pub mod bundle;
pub mod config;
pub mod error;
pub mod gateway;
pub mod node;
pub mod republish;
pub mod sync;

pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use node::{load_or_create_node_identity, NewPhoto, Node, NodeOptions};
pub use republish::spawn_republisher;
pub use sync::{UpdateNotification, UpdateSync};
