//! Rendezvous network configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the gossipsub rendezvous service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendezvousConfig {
    /// Addresses to listen on
    pub listen_addresses: Vec<String>,
    /// Peers to dial at startup
    pub bootstrap_peers: Vec<String>,
    /// Topics joined when the service starts
    pub topics: Vec<String>,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// How often this node republishes its own messages for late joiners
    #[serde(with = "humantime_serde")]
    pub republish_interval: Duration,
    /// Own messages kept for republishing; the oldest are dropped past this
    pub max_outbox: usize,
    /// Gossipsub heartbeat
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Connection idle timeout in seconds
    pub idle_timeout_secs: u64,
    /// Connection upgrade timeout
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            listen_addresses: vec!["/ip4/0.0.0.0/tcp/4101".to_string()],
            bootstrap_peers: Vec::new(),
            topics: ledgerlab_protocol::topics::all()
                .iter()
                .map(|t| t.to_string())
                .collect(),
            max_message_size: 4 * 1024 * 1024, // genesis documents can be large
            republish_interval: Duration::from_secs(5),
            max_outbox: 1024,
            heartbeat_interval: Duration::from_secs(1),
            idle_timeout_secs: 300,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl RendezvousConfig {
    /// Create a configuration for local testing
    pub fn local_test(port: u16) -> Self {
        Self {
            listen_addresses: vec![format!("/ip4/127.0.0.1/tcp/{}", port)],
            republish_interval: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// Get the idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
