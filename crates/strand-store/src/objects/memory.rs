use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use strand_shared::constants::MAX_BLOCK_SIZE;
use tokio::sync::RwLock;

use super::{collect_tree, content_id, ObjectStore};
use crate::error::ObjectError;

/// Object store held entirely in memory. Clones share the same blocks, so
/// several in-process nodes can exchange content through one instance.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    blocks: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    pins: Arc<RwLock<HashSet<String>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, data: &[u8]) -> Result<String, ObjectError> {
        if data.len() > MAX_BLOCK_SIZE {
            return Err(ObjectError::TooLarge {
                size: data.len(),
                max: MAX_BLOCK_SIZE,
            });
        }
        let cid = content_id(data);
        self.blocks
            .write()
            .await
            .entry(cid.clone())
            .or_insert_with(|| data.to_vec());
        Ok(cid)
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, ObjectError> {
        self.blocks
            .read()
            .await
            .get(cid)
            .cloned()
            .ok_or_else(|| ObjectError::NotFound(cid.to_string()))
    }

    async fn has(&self, cid: &str) -> Result<bool, ObjectError> {
        Ok(self.blocks.read().await.contains_key(cid))
    }

    async fn pin(&self, cid: &str, recursive: bool) -> Result<(), ObjectError> {
        let cids = if recursive {
            collect_tree(self, cid).await?
        } else {
            self.get(cid).await?;
            vec![cid.to_string()]
        };
        self.pins.write().await.extend(cids);
        Ok(())
    }

    async fn is_pinned(&self, cid: &str) -> Result<bool, ObjectError> {
        Ok(self.pins.read().await.contains(cid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::DirLinks;

    #[tokio::test]
    async fn test_put_get_dedup() {
        let store = MemoryObjectStore::new();
        let a = store.put(b"same").await.unwrap();
        let b = store.put(b"same").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&a).await.unwrap(), b"same");
        assert!(matches!(
            store.get(&content_id(b"other")).await,
            Err(ObjectError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dir_path_and_recursive_pin() {
        let store = MemoryObjectStore::new();
        let photo = store.put(b"photo-bytes").await.unwrap();
        let meta = store.put(b"meta-bytes").await.unwrap();

        let mut links = DirLinks::new();
        links.insert("photo".into(), photo.clone());
        links.insert("meta".into(), meta.clone());
        let dir = store.put_dir(&links).await.unwrap();

        assert_eq!(store.get_path(&format!("{dir}/photo")).await.unwrap(), b"photo-bytes");
        assert!(matches!(
            store.get_path(&format!("{dir}/caption")).await,
            Err(ObjectError::NoSuchChild { .. })
        ));

        store.pin(&dir, true).await.unwrap();
        assert!(store.is_pinned(&dir).await.unwrap());
        assert!(store.is_pinned(&photo).await.unwrap());
        assert!(store.is_pinned(&meta).await.unwrap());
    }

    #[tokio::test]
    async fn test_pin_missing_fails() {
        let store = MemoryObjectStore::new();
        assert!(store.pin(&content_id(b"nope"), true).await.is_err());
    }
}
