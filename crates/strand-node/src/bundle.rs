//! Bundle assembly: one encrypted directory node per published item.
//!
//! Every part is sealed with the thread content key before it reaches the
//! object store, so a bundle id alone reveals nothing to a peer that does
//! not hold the phrase.

use strand_shared::crypto::{decrypt, encrypt, SymmetricKey};
use strand_shared::{ContentPath, Part, PhotoMetadata};
use strand_store::objects::DirLinks;
use strand_store::{ObjectError, ObjectStore};
use tracing::debug;

use crate::error::Result;

/// Plaintext parts of an item about to be published.
pub struct BundleParts<'a> {
    pub photo: &'a [u8],
    pub thumb: &'a [u8],
    pub metadata: &'a PhotoMetadata,
    pub caption: Option<&'a str>,
    /// Content id of the previous local head; empty for the first item.
    pub prev_id: &'a str,
}

/// The decoded header parts a chain walk needs from each hop.
#[derive(Debug, Clone)]
pub struct BundleHead {
    pub metadata: PhotoMetadata,
    pub prev_id: String,
    pub caption: Option<String>,
}

/// Encrypt, store and recursively pin a bundle. Returns its content id.
pub async fn write_bundle(store: &dyn ObjectStore, key: &SymmetricKey, parts: BundleParts<'_>) -> Result<String> {
    let mut links = DirLinks::new();

    links.insert(Part::Photo.to_string(), store.put(&encrypt(key, parts.photo)?).await?);
    links.insert(Part::Thumb.to_string(), store.put(&encrypt(key, parts.thumb)?).await?);
    links.insert(
        Part::Meta.to_string(),
        store.put(&encrypt(key, &parts.metadata.to_json()?)?).await?,
    );
    links.insert(
        Part::Last.to_string(),
        store.put(&encrypt(key, parts.prev_id.as_bytes())?).await?,
    );
    if let Some(caption) = parts.caption {
        links.insert(
            Part::Caption.to_string(),
            store.put(&encrypt(key, caption.as_bytes())?).await?,
        );
    }

    let cid = store.put_dir(&links).await?;
    store.pin(&cid, true).await?;

    debug!(cid = %cid, parts = links.len(), "Bundle stored");
    Ok(cid)
}

/// Fetch and decrypt one part.
pub async fn read_part(store: &dyn ObjectStore, key: &SymmetricKey, path: &ContentPath) -> Result<Vec<u8>> {
    let sealed = store.get_path(&path.to_string()).await?;
    Ok(decrypt(key, &sealed)?)
}

/// Fetch and decode metadata, back-pointer and caption of a bundle.
///
/// Metadata and back-pointer failures are returned. A missing or
/// unreadable caption is treated as no caption.
pub async fn read_head(store: &dyn ObjectStore, key: &SymmetricKey, cid: &str) -> Result<BundleHead> {
    let meta = read_part(store, key, &ContentPath::new(cid, Part::Meta)).await?;
    let metadata = PhotoMetadata::from_json(&meta)?;

    let last = read_part(store, key, &ContentPath::new(cid, Part::Last)).await?;
    let prev_id = String::from_utf8(last)
        .map_err(|_| strand_shared::ProtocolError::NotUtf8)?
        .trim()
        .to_string();

    let caption = match read_part(store, key, &ContentPath::new(cid, Part::Caption)).await {
        Ok(bytes) => String::from_utf8(bytes).ok().filter(|c| !c.is_empty()),
        Err(crate::NodeError::Object(ObjectError::NoSuchChild { .. })) => None,
        Err(e) => {
            debug!(cid = %cid, error = %e, "Caption unreadable, ignoring");
            None
        }
    };

    Ok(BundleHead {
        metadata,
        prev_id,
        caption,
    })
}
