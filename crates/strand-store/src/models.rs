//! Records persisted in the local SQLite database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strand_shared::PhotoMetadata;

/// A joined thread as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadRecord {
    pub id: String,
    /// Local display name, unique per node.
    pub name: String,
    pub phrase: String,
    /// Ed25519 secret, stored as hex in SQLite.
    pub secret: [u8; 32],
    pub created_at: DateTime<Utc>,
}

/// One indexed item of a thread's chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateRecord {
    pub content_id: String,
    /// Content id of the previous head; empty for the first item.
    pub prev_id: String,
    pub thread_id: String,
    pub metadata: PhotoMetadata,
    pub caption: Option<String>,
    /// Authored on this node rather than fetched from a peer.
    pub is_local: bool,
    pub indexed_at: DateTime<Utc>,
}

impl UpdateRecord {
    pub fn is_genesis(&self) -> bool {
        self.prev_id.is_empty()
    }
}
