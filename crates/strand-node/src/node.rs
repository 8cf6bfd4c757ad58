//! The node context.
//!
//! A [`Node`] owns the registry, object store, bus and sync engine of one
//! Strand instance. Several nodes can live in one process; nothing here is
//! global.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use strand_net::PubSub;
use strand_shared::constants::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_THREAD_NAME};
use strand_shared::protocol::content_type_for_ext;
use strand_shared::{generate_phrase, ContentPath, NodeIdentity, Part, PhotoList, PhotoMetadata, ThreadId, ThreadIdentity};
use strand_store::{ObjectStore, RemoteObjectStore, StoreError, ThreadRegistry, UpdateRecord};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bundle::{self, BundleParts};
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::sync::{UpdateNotification, UpdateSync};

const NODE_KEY_FILE: &str = "node.key";

#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Stamped into the metadata of locally added photos.
    pub username: Option<String>,
    pub fetch_timeout: Duration,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            username: None,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

impl From<&NodeConfig> for NodeOptions {
    fn from(config: &NodeConfig) -> Self {
        Self {
            username: config.username.clone(),
            fetch_timeout: config.fetch_timeout,
        }
    }
}

/// A photo read into memory, ready to publish.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub photo: Vec<u8>,
    pub thumb: Vec<u8>,
    /// File stem.
    pub name: String,
    /// Extension with its leading dot.
    pub ext: String,
    pub created: DateTime<Utc>,
    pub caption: Option<String>,
}

pub struct Node {
    registry: Arc<ThreadRegistry>,
    objects: Arc<dyn ObjectStore>,
    bus: Arc<dyn PubSub>,
    sync: UpdateSync,
    shutdown: CancellationToken,
    publish_locks: Mutex<HashMap<ThreadId, Arc<tokio::sync::Mutex<()>>>>,
    options: NodeOptions,
}

impl Node {
    /// Assemble a node from its parts. Creates the default thread when the
    /// registry has none.
    pub fn new(
        registry: Arc<ThreadRegistry>,
        objects: Arc<dyn ObjectStore>,
        bus: Arc<dyn PubSub>,
        options: NodeOptions,
    ) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let sync = UpdateSync::new(
            registry.clone(),
            objects.clone(),
            bus.clone(),
            shutdown.clone(),
            options.fetch_timeout,
        );

        let node = Self {
            registry,
            objects,
            bus,
            sync,
            shutdown,
            publish_locks: Mutex::new(HashMap::new()),
            options,
        };
        node.ensure_default_thread()?;
        Ok(node)
    }

    /// Open the node stored under `config.data_dir`, fetching missing
    /// blocks from the configured peers.
    pub async fn open(config: &NodeConfig, bus: Arc<dyn PubSub>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let registry = ThreadRegistry::open_at(&config.data_dir.join("strand.db"))?;
        let objects = RemoteObjectStore::new(
            &config.data_dir.join("objects"),
            config.block_peers.clone(),
            config.fetch_timeout,
        )
        .await?;

        info!(path = %config.data_dir.display(), "Node repo opened");
        Self::new(Arc::new(registry), Arc::new(objects), bus, NodeOptions::from(config))
    }

    fn ensure_default_thread(&self) -> Result<()> {
        match self.registry.get(DEFAULT_THREAD_NAME) {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound) => {
                let thread = self
                    .registry
                    .create_or_join(&generate_phrase()?, DEFAULT_THREAD_NAME)?;
                info!(thread = %thread.id(), "Created default thread");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.registry
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn sync(&self) -> &UpdateSync {
        &self.sync
    }

    pub fn peer_id(&self) -> &str {
        self.bus.local_peer_id()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn subscribe_updates(&self) -> mpsc::Receiver<UpdateNotification> {
        self.sync.subscribe_updates()
    }

    // ------------------------------------------------------------------
    // Threads
    // ------------------------------------------------------------------

    /// Create a thread (fresh phrase) or join one (existing phrase) and
    /// start following it.
    pub async fn add_thread(&self, name: &str, phrase: Option<&str>) -> Result<ThreadIdentity> {
        let phrase = match phrase {
            Some(p) => p.to_string(),
            None => generate_phrase()?,
        };
        let thread = self.registry.create_or_join(&phrase, name)?;
        self.sync.join(&thread).await?;
        Ok(thread)
    }

    /// Stop following a thread and delete it with all its records.
    pub async fn remove_thread(&self, name: &str) -> Result<()> {
        let thread = self.thread(name)?;
        self.sync.leave(thread.id()).await?;
        self.registry.remove(name)?;
        self.publish_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(thread.id());
        Ok(())
    }

    /// Follow every registered thread.
    pub async fn join_all(&self) -> Result<()> {
        for thread in self.registry.list()? {
            self.sync.join(&thread).await?;
        }
        Ok(())
    }

    pub fn threads(&self) -> Result<Vec<ThreadIdentity>> {
        Ok(self.registry.list()?)
    }

    pub fn thread(&self, name: &str) -> Result<ThreadIdentity> {
        self.registry.get(name).map_err(|e| match e {
            StoreError::NotFound => NodeError::NotFound(format!("thread {name}")),
            other => other.into(),
        })
    }

    // ------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------

    /// Publish a photo and its thumbnail from disk into a thread.
    pub async fn add_photo(
        &self,
        photo_path: &Path,
        thumb_path: &Path,
        caption: Option<&str>,
        thread_name: &str,
    ) -> Result<String> {
        let photo = tokio::fs::read(photo_path).await?;
        let thumb = tokio::fs::read(thumb_path).await?;

        let name = photo_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = photo_path
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default();
        let created = tokio::fs::metadata(photo_path)
            .await
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        self.add_photo_data(
            NewPhoto {
                photo,
                thumb,
                name,
                ext,
                created,
                caption: caption.map(String::from),
            },
            thread_name,
        )
        .await
    }

    /// Publish an in-memory photo into a thread. Returns the bundle id.
    pub async fn add_photo_data(&self, photo: NewPhoto, thread_name: &str) -> Result<String> {
        let thread = self.thread(thread_name)?;
        let metadata = PhotoMetadata {
            size: photo.photo.len() as u64,
            content_type: content_type_for_ext(&photo.ext).to_string(),
            name: photo.name,
            ext: photo.ext,
            created: photo.created,
            added: Utc::now(),
            username: self.options.username.clone(),
        };
        self.publish(&thread, &photo.photo, &photo.thumb, metadata, photo.caption)
            .await
    }

    /// Re-publish an item already indexed here into another thread.
    pub async fn share_photo(&self, content_id: &str, dest_name: &str, caption: Option<&str>) -> Result<String> {
        let (record, source) = self.load_photo_and_thread(content_id)?;
        let dest = self.thread(dest_name)?;
        if source.id() == dest.id() {
            return Err(NodeError::InvalidInput(format!(
                "{content_id} already belongs to thread {dest_name}"
            )));
        }

        let key = source.content_key();
        let photo = bundle::read_part(self.objects.as_ref(), &key, &ContentPath::new(content_id, Part::Photo)).await?;
        let thumb = bundle::read_part(self.objects.as_ref(), &key, &ContentPath::new(content_id, Part::Thumb)).await?;

        let metadata = PhotoMetadata {
            added: Utc::now(),
            ..record.metadata
        };
        let caption = caption.map(String::from).or(record.caption);

        let cid = self.publish(&dest, &photo, &thumb, metadata, caption).await?;
        info!(from = %source.id(), to = %dest.id(), source_cid = %content_id, cid = %cid, "Shared photo");
        Ok(cid)
    }

    fn publish_lock(&self, thread_id: &ThreadId) -> Arc<tokio::sync::Mutex<()>> {
        self.publish_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(thread_id.clone())
            .or_default()
            .clone()
    }

    /// Chain a new bundle onto the thread's local head, index it, announce
    /// it. Nothing is indexed unless every part is stored and pinned.
    async fn publish(
        &self,
        thread: &ThreadIdentity,
        photo: &[u8],
        thumb: &[u8],
        metadata: PhotoMetadata,
        caption: Option<String>,
    ) -> Result<String> {
        let lock = self.publish_lock(thread.id());
        let guard = lock.lock().await;

        let prev_id = self
            .registry
            .latest_local(thread.id())?
            .map(|r| r.content_id)
            .unwrap_or_default();

        let cid = bundle::write_bundle(
            self.objects.as_ref(),
            &thread.content_key(),
            BundleParts {
                photo,
                thumb,
                metadata: &metadata,
                caption: caption.as_deref(),
                prev_id: &prev_id,
            },
        )
        .await?;

        self.registry.index_update(&UpdateRecord {
            content_id: cid.clone(),
            prev_id: prev_id.clone(),
            thread_id: thread.id().to_string(),
            metadata,
            caption,
            is_local: true,
            indexed_at: Utc::now(),
        })?;
        drop(guard);

        debug!(thread = %thread.id(), cid = %cid, prev = %prev_id, "Published update");
        self.sync.announce(thread.id(), &cid).await?;
        Ok(cid)
    }

    /// Announce every thread's local head. Returns how many were announced.
    pub async fn republish_latest_updates(&self) -> Result<usize> {
        let mut announced = 0;
        for thread in self.registry.list()? {
            let Some(head) = self.registry.latest_local(thread.id())? else {
                continue;
            };
            match self.sync.announce(thread.id(), &head.content_id).await {
                Ok(()) => announced += 1,
                Err(e) => warn!(thread = %thread.id(), error = %e, "Republish failed"),
            }
        }
        Ok(announced)
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// A page of a thread's content ids, newest first. An unknown thread
    /// yields an empty list.
    pub fn get_photos(&self, offset_id: &str, limit: usize, thread_name: &str) -> Result<PhotoList> {
        let thread = match self.registry.get(thread_name) {
            Ok(t) => t,
            Err(StoreError::NotFound) => return Ok(PhotoList::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(PhotoList {
            hashes: self.registry.page(thread.id(), offset_id, limit)?,
        })
    }

    /// Decrypted bytes of `<cid>/<part>`. The key comes from `thread_name`
    /// when given, otherwise from the thread the update is indexed under.
    pub async fn get_file(&self, path: &str, thread_name: Option<&str>) -> Result<Vec<u8>> {
        let path: ContentPath = path.parse()?;
        let thread = match thread_name {
            Some(name) => self.thread(name)?,
            None => self.load_photo_and_thread(&path.content_id)?.1,
        };
        bundle::read_part(self.objects.as_ref(), &thread.content_key(), &path).await
    }

    pub fn get_metadata(&self, content_id: &str) -> Result<PhotoMetadata> {
        Ok(self.update(content_id)?.metadata)
    }

    pub fn get_last_hash(&self, content_id: &str) -> Result<String> {
        Ok(self.update(content_id)?.prev_id)
    }

    pub fn load_photo_and_thread(&self, content_id: &str) -> Result<(UpdateRecord, ThreadIdentity)> {
        self.registry
            .load_update_and_thread(content_id)
            .map_err(|e| not_found_as(e, content_id))
    }

    fn update(&self, content_id: &str) -> Result<UpdateRecord> {
        self.registry
            .get_update(content_id)
            .map_err(|e| not_found_as(e, content_id))
    }

    /// Raw stored bytes of a block, if held locally. Never fetches.
    pub async fn get_block(&self, content_id: &str) -> Result<Option<Vec<u8>>> {
        if !self.objects.has(content_id).await? {
            return Ok(None);
        }
        Ok(Some(self.objects.get(content_id).await?))
    }

    /// Stop every listener and wait for them.
    pub async fn shutdown(&self) {
        info!("Node shutting down");
        self.sync.shutdown().await;
    }
}

fn not_found_as(e: StoreError, what: &str) -> NodeError {
    match e {
        StoreError::NotFound => NodeError::NotFound(what.to_string()),
        other => other.into(),
    }
}

/// Load the node's peer key from `data_dir`, creating it on first run.
pub fn load_or_create_node_identity(data_dir: &Path) -> Result<NodeIdentity> {
    let path = data_dir.join(NODE_KEY_FILE);
    match std::fs::read(&path) {
        Ok(bytes) => {
            let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                strand_shared::IdentityError::KeyFile(format!("{} is not a 32-byte key", path.display()))
            })?;
            Ok(NodeIdentity::from_secret_bytes(&secret))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(data_dir)?;
            let identity = NodeIdentity::generate();
            std::fs::write(&path, identity.secret_bytes())?;
            info!(path = %path.display(), "Generated node key");
            Ok(identity)
        }
        Err(e) => Err(e.into()),
    }
}
