//! Thread synchronisation.
//!
//! Joining a thread subscribes to its topic and spawns a listener task.
//! Each announcement received there is handed to its own chain walk, which
//! follows back-pointers from the announced head until it reaches genesis
//! or an update that is already indexed, indexing every hop on the way.
//!
//! Walks of the same thread may overlap. The registry's atomic
//! check-and-insert makes the loser of any race on a hop stop quietly;
//! whoever indexed that hop first also owns the rest of the chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use strand_net::{BusMessage, PubSub, Subscription};
use strand_shared::constants::NOTIFY_QUEUE_CAPACITY;
use strand_shared::{Announcement, ThreadId, ThreadIdentity};
use strand_store::{ObjectStore, ThreadRegistry, UpdateRecord};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bundle::{self, BundleHead};
use crate::error::{NodeError, Result};

/// Sent to local listeners for every update indexed by a chain walk.
#[derive(Debug, Clone)]
pub struct UpdateNotification {
    pub thread_id: ThreadId,
    pub thread_name: String,
    pub update: UpdateRecord,
}

struct Joined {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct UpdateSync {
    registry: Arc<ThreadRegistry>,
    objects: Arc<dyn ObjectStore>,
    bus: Arc<dyn PubSub>,
    shutdown: CancellationToken,
    fetch_timeout: Duration,
    joined: Arc<tokio::sync::Mutex<HashMap<ThreadId, Joined>>>,
    listeners: Arc<Mutex<Vec<mpsc::Sender<UpdateNotification>>>>,
}

impl UpdateSync {
    pub fn new(
        registry: Arc<ThreadRegistry>,
        objects: Arc<dyn ObjectStore>,
        bus: Arc<dyn PubSub>,
        shutdown: CancellationToken,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            objects,
            bus,
            shutdown,
            fetch_timeout,
            joined: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start following a thread. Joining twice is a no-op. Fails once the
    /// node is shutting down.
    pub async fn join(&self, thread: &ThreadIdentity) -> Result<()> {
        let mut joined = self.joined.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(NodeError::ShuttingDown);
        }
        if joined.contains_key(thread.id()) {
            return Ok(());
        }

        let subscription = self.bus.subscribe(&thread.id().to_topic()).await?;
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(self.clone().listen(thread.clone(), subscription, cancel.clone()));

        joined.insert(thread.id().clone(), Joined { cancel, task });
        info!(thread = %thread.id(), name = thread.name(), "Joined thread");
        Ok(())
    }

    /// Stop following a thread and wait for its listener to exit. Leaving a
    /// thread that is not joined is a no-op.
    ///
    /// The table lock is held until the topic is unsubscribed, so a
    /// concurrent `join` of the same thread starts from a clean slate.
    pub async fn leave(&self, thread_id: &ThreadId) -> Result<()> {
        let mut joined = self.joined.lock().await;
        let Some(entry) = joined.remove(thread_id) else {
            return Ok(());
        };

        entry.cancel.cancel();
        if let Err(e) = entry.task.await {
            warn!(thread = %thread_id, error = %e, "Listener task ended abnormally");
        }
        self.bus.unsubscribe(&thread_id.to_topic()).await?;
        drop(joined);

        info!(thread = %thread_id, "Left thread");
        Ok(())
    }

    pub async fn is_joined(&self, thread_id: &ThreadId) -> bool {
        self.joined.lock().await.contains_key(thread_id)
    }

    /// Cancel every listener and wait for them. Walks already running finish
    /// their current hop.
    pub async fn shutdown(&self) {
        let mut joined = self.joined.lock().await;
        self.shutdown.cancel();
        let entries: Vec<(ThreadId, Joined)> = joined.drain().collect();
        for (thread_id, entry) in entries {
            if let Err(e) = entry.task.await {
                warn!(thread = %thread_id, error = %e, "Listener task ended abnormally");
            }
            if let Err(e) = self.bus.unsubscribe(&thread_id.to_topic()).await {
                debug!(thread = %thread_id, error = %e, "Unsubscribe during shutdown failed");
            }
        }
    }

    /// Register a listener for indexed updates.
    ///
    /// Delivery is lossy: when the queue is full the notification is
    /// dropped rather than stalling the walk. Consumers that must not miss
    /// anything should read the registry instead.
    pub fn subscribe_updates(&self) -> mpsc::Receiver<UpdateNotification> {
        let (tx, rx) = mpsc::channel(NOTIFY_QUEUE_CAPACITY);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }

    /// Announce `content_id` as the head of a thread.
    pub async fn announce(&self, thread_id: &ThreadId, content_id: &str) -> Result<()> {
        self.bus
            .publish(&thread_id.to_topic(), Announcement::new(content_id).to_bytes())
            .await?;
        debug!(thread = %thread_id, cid = %content_id, "Announced head");
        Ok(())
    }

    async fn listen(self, thread: ThreadIdentity, mut subscription: Subscription, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = subscription.next() => match msg {
                    Some(msg) => self.dispatch(&thread, msg, &cancel),
                    None => {
                        debug!(thread = %thread.id(), "Subscription closed");
                        break;
                    }
                },
            }
        }
        debug!(thread = %thread.id(), "Listener stopped");
    }

    fn dispatch(&self, thread: &ThreadIdentity, msg: BusMessage, cancel: &CancellationToken) {
        if msg.from == self.bus.local_peer_id() {
            return;
        }

        let announcement = match Announcement::from_bytes(&msg.data) {
            Ok(a) => a,
            Err(e) => {
                warn!(thread = %thread.id(), peer = %msg.from, error = %e, "Bad announcement");
                return;
            }
        };

        if announcement.relayed {
            debug!(thread = %thread.id(), peer = %msg.from, cid = %announcement.content_id, "Relayed announcement");
        } else {
            debug!(thread = %thread.id(), peer = %msg.from, cid = %announcement.content_id, "Announcement");
        }

        let sync = self.clone();
        let thread = thread.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let cid = announcement.content_id;
            match sync.handle_hash(&thread, &cid, &cancel).await {
                Ok(0) => {}
                Ok(count) => info!(thread = %thread.id(), head = %cid, count, "Chain walk indexed updates"),
                Err(e) => warn!(thread = %thread.id(), head = %cid, error = %e, "Chain walk aborted"),
            }
        });
    }

    /// Walk the chain backwards from `content_id`, indexing every hop not
    /// yet known. Returns how many updates this walk indexed.
    ///
    /// Stops successfully at genesis, at an already indexed update, on
    /// losing an indexing race, or when `cancel` fires between hops. Fetch,
    /// decrypt and decode failures abort the walk.
    pub async fn handle_hash(
        &self,
        thread: &ThreadIdentity,
        content_id: &str,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let key = thread.content_key();
        let mut next = content_id.trim().to_string();
        let mut indexed = 0;

        loop {
            if next.is_empty() {
                debug!(thread = %thread.id(), "Reached genesis");
                break;
            }
            if cancel.is_cancelled() {
                debug!(thread = %thread.id(), cid = %next, "Walk cancelled");
                break;
            }
            if self.registry.is_indexed(&next)? {
                break;
            }

            let head = self.fetch_hop(&key, &next).await?;

            let record = UpdateRecord {
                content_id: next.clone(),
                prev_id: head.prev_id.clone(),
                thread_id: thread.id().to_string(),
                metadata: head.metadata,
                caption: head.caption,
                is_local: false,
                indexed_at: Utc::now(),
            };

            match self.registry.index_update(&record).map_err(NodeError::from) {
                Ok(()) => {}
                Err(NodeError::AlreadyIndexed(_)) => {
                    debug!(thread = %thread.id(), cid = %next, "Lost indexing race");
                    break;
                }
                Err(e) => return Err(e),
            }
            indexed += 1;

            self.notify(UpdateNotification {
                thread_id: thread.id().clone(),
                thread_name: thread.name().to_string(),
                update: record,
            });

            next = head.prev_id;
        }

        Ok(indexed)
    }

    async fn fetch_hop(&self, key: &strand_shared::crypto::SymmetricKey, cid: &str) -> Result<BundleHead> {
        let objects = self.objects.as_ref();
        let fetch = async {
            objects.pin(cid, true).await?;
            bundle::read_head(objects, key, cid).await
        };
        tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .map_err(|_| NodeError::FetchTimeout(cid.to_string()))?
    }

    fn notify(&self, notification: UpdateNotification) {
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };
        listeners.retain(|tx| match tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(cid = %notification.update.content_id, "Listener queue full, notification dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }
}
