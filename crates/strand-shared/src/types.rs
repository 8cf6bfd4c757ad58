use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// Thread identity = base58 peer id of the thread's Ed25519 public key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pub/sub topic the thread is announced on.
    pub fn to_topic(&self) -> String {
        self.0.clone()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Well-known child names of a bundle directory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Part {
    Photo,
    Thumb,
    Meta,
    Last,
    Caption,
}

impl Part {
    pub const ALL: [Part; 5] = [Part::Photo, Part::Thumb, Part::Meta, Part::Last, Part::Caption];

    pub fn as_str(&self) -> &'static str {
        match self {
            Part::Photo => "photo",
            Part::Thumb => "thumb",
            Part::Meta => "meta",
            Part::Last => "last",
            Part::Caption => "caption",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Part {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Part::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownPart(s.to_string()))
    }
}

/// `<content_id>/<part>`, optionally prefixed with `/` or `/ipfs/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPath {
    pub content_id: String,
    pub part: Part,
}

impl ContentPath {
    pub fn new(content_id: impl Into<String>, part: Part) -> Self {
        Self {
            content_id: content_id.into(),
            part,
        }
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.content_id, self.part)
    }
}

impl FromStr for ContentPath {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("/ipfs/").unwrap_or(s).trim_start_matches('/');
        let (cid, part) = trimmed
            .split_once('/')
            .ok_or_else(|| ProtocolError::BadPath(s.to_string()))?;
        if cid.is_empty() || part.contains('/') {
            return Err(ProtocolError::BadPath(s.to_string()));
        }
        Ok(Self {
            content_id: cid.to_string(),
            part: part.parse()?,
        })
    }
}
