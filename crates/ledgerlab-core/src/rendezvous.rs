//! Rendezvous channel interface
//!
//! Out-of-band coordination between participants. Each topic is an
//! append-only log: a subscriber receives every payload ever published on the
//! topic, starting from the first one, followed by live publications.
//! Delivery is at-least-once, so consumers must tolerate repeats.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

/// Publish/subscribe service shared by all participants
#[async_trait]
pub trait Rendezvous: Send + Sync {
    /// Append `payload` to `topic`
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Replay `topic` from its beginning, then follow new payloads
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

/// Payload stream for one topic
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next payload, or `None` once the channel shut down
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
