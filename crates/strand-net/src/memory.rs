//! In-process bus. Every [`MemoryBus`] connected to the same [`MemoryHub`]
//! sees the others' messages, which lets several nodes run in one process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bus::{BusMessage, PubSub, Subscription, SUBSCRIPTION_CAPACITY};
use crate::error::BusError;

type Subscribers = HashMap<String, HashMap<String, mpsc::Sender<BusMessage>>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    // topic -> peer id -> sender
    topics: Arc<Mutex<Subscribers>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus handle publishing as `peer_id`.
    pub fn connect(&self, peer_id: impl Into<String>) -> MemoryBus {
        MemoryBus {
            hub: self.clone(),
            peer_id: peer_id.into(),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Subscribers>, BusError> {
        self.topics.lock().map_err(|_| BusError::Closed)
    }
}

/// One node's handle on a [`MemoryHub`].
///
/// Unlike GossipSub, the publisher receives its own messages when it is
/// subscribed to the topic.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    hub: MemoryHub,
    peer_id: String,
}

#[async_trait]
impl PubSub for MemoryBus {
    fn local_peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.hub
            .lock()?
            .entry(topic.to_string())
            .or_default()
            .insert(self.peer_id.clone(), tx);
        debug!(topic = %topic, peer = %self.peer_id, "Subscribed");
        Ok(Subscription::new(topic.to_string(), rx))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        let mut topics = self.hub.lock()?;
        if let Some(subs) = topics.get_mut(topic) {
            subs.remove(&self.peer_id);
            if subs.is_empty() {
                topics.remove(topic);
            }
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), BusError> {
        let topics = self.hub.lock()?;
        let Some(subs) = topics.get(topic) else {
            return Ok(());
        };
        for (peer, tx) in subs {
            let msg = BusMessage {
                from: self.peer_id.clone(),
                topic: topic.to_string(),
                data: data.clone(),
            };
            if tx.try_send(msg).is_err() {
                warn!(topic = %topic, peer = %peer, "Subscriber queue full or closed, message dropped");
            }
        }
        Ok(())
    }
}
