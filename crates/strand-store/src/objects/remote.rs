use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{collect_tree, content_id, validate_cid, FsObjectStore, ObjectStore};
use crate::error::ObjectError;

/// Filesystem store that pulls missing blocks from peers.
///
/// A miss is resolved by asking each peer's block endpoint
/// (`<base>/blocks/<cid>`) in turn. Fetched bytes are hashed and only
/// accepted when they match the requested id.
#[derive(Debug, Clone)]
pub struct RemoteObjectStore {
    local: FsObjectStore,
    peers: Vec<String>,
    client: reqwest::Client,
}

impl RemoteObjectStore {
    pub async fn new(base_path: &Path, peers: Vec<String>, timeout: Duration) -> Result<Self, ObjectError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ObjectError::Remote(e.to_string()))?;

        Ok(Self {
            local: FsObjectStore::new(base_path).await?,
            peers: peers
                .into_iter()
                .map(|p| p.trim_end_matches('/').to_string())
                .collect(),
            client,
        })
    }

    async fn fetch(&self, cid: &str) -> Result<Vec<u8>, ObjectError> {
        for peer in &self.peers {
            match self.fetch_from(peer, cid).await {
                Ok(data) => {
                    self.local.write_block(cid, &data).await?;
                    debug!(cid = %cid, peer = %peer, size = data.len(), "Fetched block");
                    return Ok(data);
                }
                Err(e) => debug!(cid = %cid, peer = %peer, error = %e, "Peer fetch failed"),
            }
        }
        Err(ObjectError::NotFound(cid.to_string()))
    }

    async fn fetch_from(&self, peer: &str, cid: &str) -> Result<Vec<u8>, ObjectError> {
        let url = format!("{peer}/blocks/{cid}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ObjectError::Remote(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ObjectError::Remote(format!("{url} answered {}", resp.status())));
        }

        let data = resp
            .bytes()
            .await
            .map_err(|e| ObjectError::Remote(e.to_string()))?;

        let actual = content_id(&data);
        if actual != cid {
            warn!(peer = %peer, expected = %cid, actual = %actual, "Peer served wrong block");
            return Err(ObjectError::HashMismatch {
                expected: cid.to_string(),
                actual,
            });
        }
        Ok(data.to_vec())
    }
}

#[async_trait]
impl ObjectStore for RemoteObjectStore {
    async fn put(&self, data: &[u8]) -> Result<String, ObjectError> {
        self.local.put(data).await
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, ObjectError> {
        validate_cid(cid)?;
        match self.local.get(cid).await {
            Err(ObjectError::NotFound(_)) => self.fetch(cid).await,
            other => other,
        }
    }

    async fn has(&self, cid: &str) -> Result<bool, ObjectError> {
        self.local.has(cid).await
    }

    async fn pin(&self, cid: &str, recursive: bool) -> Result<(), ObjectError> {
        let cids = if recursive {
            collect_tree(self, cid).await?
        } else {
            self.get(cid).await?;
            vec![cid.to_string()]
        };
        for cid in &cids {
            self.local.mark_pinned(cid).await?;
        }
        Ok(())
    }

    async fn is_pinned(&self, cid: &str) -> Result<bool, ObjectError> {
        self.local.is_pinned(cid).await
    }
}
