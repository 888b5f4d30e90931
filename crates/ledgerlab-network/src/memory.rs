//! In-process rendezvous channel
//!
//! Every clone shares the same topic logs, so participants running as tasks
//! in one process can coordinate exactly as they would over the network.

use async_trait::async_trait;
use ledgerlab_core::rendezvous::{Rendezvous, Subscription};
use ledgerlab_core::{HarnessError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::log::TopicLogs;

#[derive(Clone, Debug, Default)]
pub struct MemoryRendezvous {
    logs: TopicLogs,
    fail_publish: Arc<AtomicBool>,
}

impl MemoryRendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail (or succeed again)
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Number of payloads published on `topic`
    pub fn published(&self, topic: &str) -> usize {
        self.logs.len(topic)
    }

    /// Raw payloads published on `topic`, in order
    pub fn entries(&self, topic: &str) -> Vec<Vec<u8>> {
        self.logs.entries(topic)
    }

    /// End every open subscription
    pub fn close(&self) {
        self.logs.close();
    }
}

#[async_trait]
impl Rendezvous for MemoryRendezvous {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(HarnessError::Rendezvous(format!(
                "publish to {} rejected",
                topic
            )));
        }
        debug!(topic, bytes = payload.len(), "Appending to memory rendezvous");
        self.logs.append(topic, payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        Ok(self.logs.subscribe(topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_topics() {
        let a = MemoryRendezvous::new();
        let b = a.clone();

        a.publish("peer_packets", vec![1]).await.unwrap();
        let mut sub = b.subscribe("peer_packets").await.unwrap();
        assert_eq!(sub.next().await, Some(vec![1]));
        assert_eq!(b.published("peer_packets"), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_injection() {
        let rendezvous = MemoryRendezvous::new();
        rendezvous.set_fail_publish(true);
        let err = rendezvous.publish("commands", vec![1]).await.unwrap_err();
        assert!(matches!(err, HarnessError::Rendezvous(_)));
        assert_eq!(rendezvous.published("commands"), 0);

        rendezvous.set_fail_publish(false);
        assert!(rendezvous.publish("commands", vec![1]).await.is_ok());
    }
}
