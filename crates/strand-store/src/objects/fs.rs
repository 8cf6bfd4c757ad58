use std::path::{Path, PathBuf};

use async_trait::async_trait;
use strand_shared::constants::MAX_BLOCK_SIZE;
use tokio::fs;
use tracing::{debug, info};

use super::{collect_tree, content_id, validate_cid, ObjectStore};
use crate::error::ObjectError;

/// Object store on the local filesystem.
///
/// Layout under the base directory:
/// - `blocks/<cid>`: object bytes
/// - `pins/<cid>`: empty marker file
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    blocks: PathBuf,
    pins: PathBuf,
    max_size: usize,
}

impl FsObjectStore {
    pub async fn new(base_path: &Path) -> Result<Self, ObjectError> {
        let blocks = base_path.join("blocks");
        let pins = base_path.join("pins");
        fs::create_dir_all(&blocks).await?;
        fs::create_dir_all(&pins).await?;

        info!(path = %base_path.display(), "Object store initialized");

        Ok(Self {
            blocks,
            pins,
            max_size: MAX_BLOCK_SIZE,
        })
    }

    fn block_path(&self, cid: &str) -> Result<PathBuf, ObjectError> {
        validate_cid(cid)?;
        Ok(self.blocks.join(cid))
    }

    fn pin_path(&self, cid: &str) -> Result<PathBuf, ObjectError> {
        validate_cid(cid)?;
        Ok(self.pins.join(cid))
    }

    /// Write bytes already known to hash to `cid`.
    pub(crate) async fn write_block(&self, cid: &str, data: &[u8]) -> Result<(), ObjectError> {
        let path = self.block_path(cid)?;
        if fs::try_exists(&path).await? {
            return Ok(());
        }

        // Write then rename so readers never observe a partial block.
        let tmp = self.blocks.join(format!(".{cid}.tmp"));
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await?;

        debug!(cid = %cid, size = data.len(), "Stored block");
        Ok(())
    }

    pub(crate) async fn mark_pinned(&self, cid: &str) -> Result<(), ObjectError> {
        fs::write(self.pin_path(cid)?, b"").await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, data: &[u8]) -> Result<String, ObjectError> {
        if data.len() > self.max_size {
            return Err(ObjectError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }
        let cid = content_id(data);
        self.write_block(&cid, data).await?;
        Ok(cid)
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, ObjectError> {
        let path = self.block_path(cid)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectError::NotFound(cid.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn has(&self, cid: &str) -> Result<bool, ObjectError> {
        Ok(fs::try_exists(self.block_path(cid)?).await?)
    }

    async fn pin(&self, cid: &str, recursive: bool) -> Result<(), ObjectError> {
        let cids = if recursive {
            collect_tree(self, cid).await?
        } else {
            if !self.has(cid).await? {
                return Err(ObjectError::NotFound(cid.to_string()));
            }
            vec![cid.to_string()]
        };
        for cid in &cids {
            self.mark_pinned(cid).await?;
        }
        Ok(())
    }

    async fn is_pinned(&self, cid: &str) -> Result<bool, ObjectError> {
        Ok(fs::try_exists(self.pin_path(cid)?).await?)
    }
}
