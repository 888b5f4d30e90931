//! Per-topic append-only logs with replay
//!
//! Both rendezvous implementations keep their topic state here. A
//! subscriber first receives every entry already in the log, then each new
//! entry as it is appended. Replay and registration happen under one lock, so
//! no entry is skipped or delivered twice to the same subscriber.

use ledgerlab_core::rendezvous::Subscription;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct TopicLog {
    entries: Vec<Vec<u8>>,
    digests: HashSet<[u8; 32]>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<u8>>>,
}

/// Shared set of topic logs
#[derive(Clone, Default)]
pub struct TopicLogs {
    topics: Arc<Mutex<HashMap<String, TopicLog>>>,
    deduplicate: bool,
}

impl TopicLogs {
    /// Logs that keep every appended payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs that drop payloads whose content digest was already appended
    pub fn deduplicating() -> Self {
        Self {
            deduplicate: true,
            ..Self::default()
        }
    }

    /// Append a payload and fan it out to live subscribers.
    ///
    /// Returns false if the payload was dropped as a duplicate.
    pub fn append(&self, topic: &str, payload: Vec<u8>) -> bool {
        let mut topics = self.topics.lock();
        let log = topics.entry(topic.to_string()).or_default();

        if self.deduplicate && !log.digests.insert(ledgerlab_protocol::digest(&payload)) {
            return false;
        }

        log.subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        log.entries.push(payload);
        true
    }

    /// Replay a topic from its first entry, then follow it
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = self.topics.lock();
        let log = topics.entry(topic.to_string()).or_default();

        for entry in &log.entries {
            // rx is held below, send cannot fail
            let _ = tx.send(entry.clone());
        }
        log.subscribers.push(tx);

        Subscription::new(topic, rx)
    }

    /// Number of entries in a topic
    pub fn len(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, |log| log.entries.len())
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Snapshot of a topic's entries
    pub fn entries(&self, topic: &str) -> Vec<Vec<u8>> {
        self.topics
            .lock()
            .get(topic)
            .map(|log| log.entries.clone())
            .unwrap_or_default()
    }

    /// Drop all live subscribers so their streams end
    pub fn close(&self) {
        for log in self.topics.lock().values_mut() {
            log.subscribers.clear();
        }
    }
}

impl std::fmt::Debug for TopicLogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.lock();
        f.debug_struct("TopicLogs")
            .field("topics", &topics.keys().collect::<Vec<_>>())
            .field("deduplicate", &self.deduplicate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_late_subscriber_sees_history_then_live() {
        let logs = TopicLogs::new();
        logs.append("t", vec![1]);
        logs.append("t", vec![2]);

        let mut sub = logs.subscribe("t");
        logs.append("t", vec![3]);

        assert_eq!(sub.next().await, Some(vec![1]));
        assert_eq!(sub.next().await, Some(vec![2]));
        assert_eq!(sub.next().await, Some(vec![3]));
        assert_eq!(logs.len("t"), 3);
    }

    #[tokio::test]
    async fn test_topics_are_independent() {
        let logs = TopicLogs::new();
        logs.append("a", vec![1]);
        let mut sub = logs.subscribe("b");
        logs.append("b", vec![2]);

        assert_eq!(sub.next().await, Some(vec![2]));
        assert!(logs.is_empty("c"));
    }

    #[test]
    fn test_plain_logs_keep_repeats() {
        let logs = TopicLogs::new();
        assert!(logs.append("t", vec![7]));
        assert!(logs.append("t", vec![7]));
        assert_eq!(logs.entries("t"), vec![vec![7], vec![7]]);
    }

    #[test]
    fn test_deduplicating_logs_drop_repeats() {
        let logs = TopicLogs::deduplicating();
        assert!(logs.append("t", vec![7]));
        assert!(!logs.append("t", vec![7]));
        assert!(logs.append("t", vec![8]));
        assert_eq!(logs.len("t"), 2);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let logs = TopicLogs::new();
        let mut sub = logs.subscribe("t");
        logs.close();
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let logs = TopicLogs::new();
        let sub = logs.subscribe("t");
        drop(sub);
        assert!(logs.append("t", vec![1]));
        assert_eq!(logs.topics.lock()["t"].subscribers.len(), 0);
    }
}
