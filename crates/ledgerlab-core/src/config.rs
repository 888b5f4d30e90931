//! Configuration types for a harness run
//!
//! `RunParams` holds the already-parsed inputs to the Plan/Execute/Retro
//! entry points, `WaitConfig` tunes the polling primitives, and
//! `TestgroundConfig` is the per-node configuration set the leader
//! distributes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::command::LoadParams;
use crate::error::BootstrapError;
use crate::genesis::GenesisDocument;
use crate::packet::PeerPacket;
use crate::types::Height;
use crate::{HarnessError, Result};

/// Height the local node must reach before a role leaves Plan
pub const DEFAULT_MIN_START_HEIGHT: Height = 2;

/// Parameters for one test run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    /// Chain id written into genesis
    pub chain_id: String,
    /// Name of the leader participant
    pub leader: String,
    /// Names of every expected follower
    pub followers: Vec<String>,
    /// Height at which Execute stops waiting
    pub halt_height: Height,
    /// Height the local node must reach before Plan completes
    pub min_start_height: Height,
    /// Size of each load transaction in bytes
    pub tx_size: usize,
    /// Transactions submitted per load round
    pub txs_per_round: usize,
    /// How long followers generate load
    #[serde(with = "humantime_serde")]
    pub load_duration: Duration,
    /// Pause before the leader issues load
    #[serde(with = "humantime_serde")]
    pub warmup: Duration,
    /// Deadline for packet collection and config distribution
    #[serde(with = "humantime_serde")]
    pub setup_timeout: Duration,
    /// Deadline for the local node to reach `min_start_height`
    #[serde(with = "humantime_serde")]
    pub local_start_timeout: Duration,
    /// Deadline for reaching `halt_height`
    #[serde(with = "humantime_serde")]
    pub execution_timeout: Duration,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            chain_id: "ledgerlab-testnet".to_string(),
            leader: "leader".to_string(),
            followers: Vec::new(),
            halt_height: 100,
            min_start_height: DEFAULT_MIN_START_HEIGHT,
            tx_size: 100_000,
            txs_per_round: 1,
            load_duration: Duration::from_secs(60),
            warmup: Duration::from_secs(20),
            setup_timeout: Duration::from_secs(5 * 60),
            local_start_timeout: Duration::from_secs(5 * 60),
            execution_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl RunParams {
    /// Parameters for a small local run with `followers` followers
    pub fn local_test(followers: usize) -> Self {
        Self {
            followers: (0..followers).map(|i| format!("follower-{}", i)).collect(),
            halt_height: 10,
            tx_size: 1_000,
            load_duration: Duration::from_secs(10),
            warmup: Duration::ZERO,
            setup_timeout: Duration::from_secs(30),
            local_start_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(120),
            ..Default::default()
        }
    }

    /// Check the parameters are usable
    pub fn validate(&self) -> Result<()> {
        if self.chain_id.is_empty() {
            return Err(HarnessError::Config("chain_id must not be empty".into()));
        }
        if self.followers.is_empty() {
            return Err(HarnessError::Config("at least one follower is required".into()));
        }

        let mut names = BTreeSet::new();
        names.insert(self.leader.as_str());
        for name in &self.followers {
            if !names.insert(name.as_str()) {
                return Err(HarnessError::Config(format!("duplicate participant name {}", name)));
            }
        }

        if self.min_start_height < 1 {
            return Err(HarnessError::Config("min_start_height must be at least 1".into()));
        }
        if self.halt_height < self.min_start_height {
            return Err(HarnessError::Config(format!(
                "halt_height {} is below min_start_height {}",
                self.halt_height, self.min_start_height
            )));
        }
        Ok(())
    }

    /// Load command parameters derived from the run parameters
    pub fn load_params(&self) -> LoadParams {
        LoadParams {
            name: "txsim".to_string(),
            duration: self.load_duration,
            tx_sizes: vec![self.tx_size; self.txs_per_round],
        }
    }
}

/// Tuning for the polling wait primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Interval between polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Timeout for the height shorthands and unbounded tx waits
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Timeout for the timestamp shorthand
    #[serde(with = "humantime_serde")]
    pub timestamp_timeout: Duration,
    /// Bound on every individual query
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            default_timeout: Duration::from_secs(30),
            timestamp_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
        }
    }
}

/// Which role a node plays in the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Leader,
    Follower,
}

/// One participant's slice of the network configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub role: NodeRole,
    /// Participants this node keeps connections to
    pub persistent_peers: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub timeout_propose: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout_commit: Duration,
    pub max_block_bytes: u64,
    pub mempool_max_txs: usize,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, role: NodeRole) -> Self {
        Self {
            name: name.into(),
            role,
            persistent_peers: Vec::new(),
            timeout_propose: Duration::from_secs(3),
            timeout_commit: Duration::from_secs(1),
            max_block_bytes: 8 * 1024 * 1024,
            mempool_max_txs: 5_000,
        }
    }
}

/// Genesis plus every participant's node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestgroundConfig {
    pub chain_id: String,
    pub genesis: GenesisDocument,
    pub nodes: BTreeMap<String, NodeConfig>,
}

impl TestgroundConfig {
    /// Derive the base configuration: the leader plus one node per packet
    pub fn derive(params: &RunParams, genesis: GenesisDocument, packets: &[PeerPacket]) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            params.leader.clone(),
            NodeConfig::new(params.leader.clone(), NodeRole::Leader),
        );
        for packet in packets {
            nodes.insert(
                packet.participant.clone(),
                NodeConfig::new(packet.participant.clone(), NodeRole::Follower),
            );
        }

        Self {
            chain_id: params.chain_id.clone(),
            genesis,
            nodes,
        }
    }

    /// Get a participant's slice
    pub fn node(&self, name: &str) -> std::result::Result<&NodeConfig, BootstrapError> {
        self.nodes
            .get(name)
            .ok_or_else(|| BootstrapError::MissingNodeConfig(name.to_string()))
    }

    /// Names of every configured participant, in order
    pub fn participants(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }
}
