//! Content-addressed object store.
//!
//! Every object is addressed by the lowercase hex BLAKE3 hash of its bytes.
//! A directory node is an ordinary object whose bytes are [`DIR_MAGIC`]
//! followed by a bincode map of child name -> child content id, so a
//! bundle of parts collapses into a single id and individual parts are
//! reachable as `<cid>/<child>`.

mod fs;
mod memory;
mod remote;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::ObjectError;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use remote::RemoteObjectStore;

/// Prefix identifying an encoded directory node.
pub const DIR_MAGIC: &[u8; 8] = b"STRDIR1\0";

/// Child name -> content id.
pub type DirLinks = BTreeMap<String, String>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` and return its content id. Storing the same bytes twice
    /// yields the same id.
    async fn put(&self, data: &[u8]) -> Result<String, ObjectError>;

    /// Retrieve an object, fetching it from elsewhere if the store can.
    async fn get(&self, cid: &str) -> Result<Vec<u8>, ObjectError>;

    /// Whether the object is available without any remote fetch.
    async fn has(&self, cid: &str) -> Result<bool, ObjectError>;

    /// Pin `cid`, and with `recursive` every object reachable from it.
    /// Pinning requires the objects to be retrievable.
    async fn pin(&self, cid: &str, recursive: bool) -> Result<(), ObjectError>;

    async fn is_pinned(&self, cid: &str) -> Result<bool, ObjectError>;

    /// Store a directory node linking `children`.
    async fn put_dir(&self, children: &DirLinks) -> Result<String, ObjectError> {
        self.put(&encode_dir(children)?).await
    }

    /// Resolve `<cid>/<child>` to the child's bytes.
    async fn get_path(&self, path: &str) -> Result<Vec<u8>, ObjectError> {
        let (cid, child) = split_path(path)?;
        let links = decode_dir(cid, &self.get(cid).await?)?;
        let child_cid = links.get(child).ok_or_else(|| ObjectError::NoSuchChild {
            cid: cid.to_string(),
            child: child.to_string(),
        })?;
        self.get(child_cid).await
    }
}

/// Content id for `data`.
pub fn content_id(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Reject anything that is not a 64-character lowercase hex digest. Content
/// ids end up in file paths and URLs, so nothing else gets through.
pub fn validate_cid(cid: &str) -> Result<(), ObjectError> {
    let ok = cid.len() == 64 && cid.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if ok {
        Ok(())
    } else {
        Err(ObjectError::InvalidId(cid.to_string()))
    }
}

pub fn encode_dir(children: &DirLinks) -> Result<Vec<u8>, ObjectError> {
    let mut out = DIR_MAGIC.to_vec();
    out.extend(bincode::serialize(children)?);
    Ok(out)
}

pub fn decode_dir(cid: &str, data: &[u8]) -> Result<DirLinks, ObjectError> {
    match data.strip_prefix(DIR_MAGIC.as_slice()) {
        Some(body) => Ok(bincode::deserialize(body)?),
        None => Err(ObjectError::NotADirectory(cid.to_string())),
    }
}

fn split_path(path: &str) -> Result<(&str, &str), ObjectError> {
    let trimmed = path.strip_prefix("/ipfs/").unwrap_or(path).trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((cid, child)) if !cid.is_empty() && !child.is_empty() && !child.contains('/') => {
            Ok((cid, child))
        }
        _ => Err(ObjectError::BadPath(path.to_string())),
    }
}

/// Every content id reachable from `root`, root first. Objects are read
/// through `store`, so a fetching store pulls in missing blocks as it goes.
pub(crate) async fn collect_tree<S: ObjectStore + ?Sized>(
    store: &S,
    root: &str,
) -> Result<Vec<String>, ObjectError> {
    let mut seen = Vec::new();
    let mut pending = vec![root.to_string()];

    while let Some(cid) = pending.pop() {
        if seen.contains(&cid) {
            continue;
        }
        let data = store.get(&cid).await?;
        if let Ok(links) = decode_dir(&cid, &data) {
            pending.extend(links.into_values());
        }
        seen.push(cid);
    }
    Ok(seen)
}
