//! The publish/subscribe seam every announcement flows through.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BusError;

/// Capacity of each subscription's inbound queue.
pub const SUBSCRIPTION_CAPACITY: usize = 256;

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Base58 peer id of the node that published the message.
    pub from: String,
    pub topic: String,
    pub data: Vec<u8>,
}

/// Receiving end of a topic subscription. Yields `None` once the topic is
/// unsubscribed or the bus shuts down.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<BusMessage>,
}

impl Subscription {
    pub fn new(topic: String, rx: mpsc::Receiver<BusMessage>) -> Self {
        Self { topic, rx }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn next(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait PubSub: Send + Sync {
    /// Base58 peer id messages from this node are stamped with.
    fn local_peer_id(&self) -> &str;

    /// Start receiving `topic`. A second subscribe to the same topic
    /// replaces the first; the old [`Subscription`] ends.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError>;

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), BusError>;
}
