use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::RELAY_PREFIX;
use crate::error::ProtocolError;

/// Pub/sub payload naming the newest content id of a thread.
///
/// On the wire this is a bare UTF-8 string, either `<content_id>` or
/// `relay:<content_id>`. The relay form carries no other meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub content_id: String,
    pub relayed: bool,
}

impl Announcement {
    pub fn new(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            relayed: false,
        }
    }

    pub fn relayed(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            relayed: true,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        if self.relayed {
            format!("{RELAY_PREFIX}{}", self.content_id).into_bytes()
        } else {
            self.content_id.clone().into_bytes()
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(data).map_err(|_| ProtocolError::NotUtf8)?;
        let text = text.trim();
        Ok(match text.strip_prefix(RELAY_PREFIX) {
            Some(cid) => Self::relayed(cid),
            None => Self::new(text),
        })
    }
}

/// Descriptor stored (encrypted) in the `meta` part of every bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    /// File stem, without extension.
    pub name: String,
    /// Extension including the leading dot, e.g. `.jpg`.
    pub ext: String,
    /// Size of the primary payload in bytes.
    pub size: u64,
    pub content_type: String,
    /// When the media itself was created (file mtime at add time).
    pub created: DateTime<Utc>,
    /// When it was added to a thread.
    pub added: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl PhotoMetadata {
    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Best-effort content type from a file extension.
pub fn content_type_for_ext(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// JSON listing returned by photo queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoList {
    pub hashes: Vec<String>,
}
