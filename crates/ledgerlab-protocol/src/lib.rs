//! Ledgerlab Protocol - Wire encoding for the rendezvous channel
//!
//! Every payload on the channel is CBOR. Topics are typed so that a topic
//! name and the message type carried on it cannot drift apart.

pub mod topics;

use ledgerlab_core::rendezvous::{Rendezvous, Subscription};
use ledgerlab_core::{HarnessError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::marker::PhantomData;

pub use topics::{Topic, COMMANDS, PEER_PACKETS, TESTGROUND_CONFIG};

/// Serialize a value to CBOR bytes
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_cbor::to_vec(value).map_err(|e| HarnessError::Codec(e.to_string()))
}

/// Deserialize a value from CBOR bytes
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_cbor::from_slice(bytes).map_err(|e| HarnessError::Codec(e.to_string()))
}

/// Content digest used to recognise redelivered payloads
pub fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Short hex form of a payload digest for logs
pub fn short_digest(bytes: &[u8]) -> String {
    hex::encode(&digest(bytes)[..6])
}

/// Encode `value` and publish it on its topic
pub async fn publish<T: Serialize>(
    rendezvous: &dyn Rendezvous,
    topic: Topic<T>,
    value: &T,
) -> Result<()> {
    let payload = encode(value)?;
    tracing::debug!(topic = topic.name(), bytes = payload.len(), "Publishing");
    rendezvous.publish(topic.name(), payload).await
}

/// Subscribe to a topic and decode its payloads
pub async fn subscribe<T: DeserializeOwned>(
    rendezvous: &dyn Rendezvous,
    topic: Topic<T>,
) -> Result<TypedSubscription<T>> {
    let inner = rendezvous.subscribe(topic.name()).await?;
    Ok(TypedSubscription {
        inner,
        _marker: PhantomData,
    })
}

/// Decoding view over a [`Subscription`]
#[derive(Debug)]
pub struct TypedSubscription<T> {
    inner: Subscription,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSubscription<T> {
    /// Next decoded payload. Payloads that fail to decode are skipped.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            let bytes = self.inner.next().await?;
            match decode(&bytes) {
                Ok(value) => return Some(value),
                Err(e) => {
                    tracing::warn!(
                        topic = self.inner.topic(),
                        digest = %short_digest(&bytes),
                        "Dropping undecodable payload: {}",
                        e
                    );
                }
            }
        }
    }

    pub fn topic(&self) -> &str {
        self.inner.topic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ledgerlab_core::{Command, LoadParams};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Replays whatever was published before subscribe; no live delivery.
    #[derive(Default)]
    struct Snapshot {
        topics: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl Rendezvous for Snapshot {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
            self.topics.lock().entry(topic.to_string()).or_default().push(payload);
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<Subscription> {
            let (tx, rx) = mpsc::unbounded_channel();
            for payload in self.topics.lock().get(topic).cloned().unwrap_or_default() {
                let _ = tx.send(payload);
            }
            Ok(Subscription::new(topic, rx))
        }
    }

    #[test]
    fn test_digest_is_content_addressed() {
        assert_eq!(digest(b"a"), digest(b"a"));
        assert_ne!(digest(b"a"), digest(b"b"));
        assert_eq!(short_digest(b"a").len(), 12);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode::<Command>(&[0xff, 0x00]).is_err());
    }

    #[tokio::test]
    async fn test_typed_subscription_skips_undecodable_payloads() {
        let rendezvous = Snapshot::default();
        rendezvous
            .publish(COMMANDS.name(), vec![0xde, 0xad])
            .await
            .unwrap();
        let load = Command::start_load(
            1,
            LoadParams {
                name: "txsim".into(),
                duration: Duration::from_secs(5),
                tx_sizes: vec![10],
            },
        );
        publish(&rendezvous, COMMANDS, &load).await.unwrap();
        publish(&rendezvous, COMMANDS, &Command::end_test(2)).await.unwrap();

        let mut sub = subscribe(&rendezvous, COMMANDS).await.unwrap();
        assert_eq!(sub.topic(), "commands");
        assert_eq!(sub.next().await, Some(load));
        assert_eq!(sub.next().await, Some(Command::end_test(2)));
        assert_eq!(sub.next().await, None);
    }
}
