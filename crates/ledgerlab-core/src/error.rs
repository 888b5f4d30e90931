//! Error types for the harness
//!
//! The taxonomy separates transient ledger failures (`Query`, `NotFound`),
//! which polling loops recover from, from terminal outcomes (`Timeout`,
//! `Cancelled`, `Bootstrap`) that always reach the caller.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Height, TxHash};

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum HarnessError {
    // ===== Ledger Errors =====
    /// Transient failure talking to the ledger
    #[error("Query error: {0}")]
    Query(String),

    /// A queried entity does not exist (yet)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transaction rejected by the ledger
    #[error("Broadcast rejected with code {code}: {log}")]
    Broadcast { code: u32, log: String },

    // ===== Wait Errors =====
    /// A bounded wait elapsed without its condition being met
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The caller's own cancellation fired
    #[error("Operation cancelled")]
    Cancelled,

    // ===== Coordination Errors =====
    /// Fatal setup failure
    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    /// Rendezvous channel failure
    #[error("Rendezvous error: {0}")]
    Rendezvous(String),

    /// Encoding or decoding failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// A role was driven through its phases out of order
    #[error("Invalid phase transition: {0}")]
    Phase(String),

    // ===== Node & Configuration Errors =====
    /// Local node lifecycle failure
    #[error("Node error: {0}")]
    Node(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HarnessError {
    /// Errors that polling loops swallow and retry
    pub fn is_transient(&self) -> bool {
        matches!(self, HarnessError::Query(_) | HarnessError::NotFound(_))
    }

    /// Check if this is a wait timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::Timeout(_))
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HarnessError::Cancelled)
    }

    /// Get the timeout details, if any
    pub fn as_timeout(&self) -> Option<&TimeoutError> {
        match self {
            HarnessError::Timeout(t) => Some(t),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::Codec(err.to_string())
    }
}

impl From<serde_cbor::Error> for HarnessError {
    fn from(err: serde_cbor::Error) -> Self {
        HarnessError::Codec(err.to_string())
    }
}

/// Fatal bootstrap failures. These always abort the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// Some followers never delivered their packet before the setup deadline
    #[error("{received}/{expected} peer packets received; missing: {}", .missing.join(", "))]
    MissingPackets {
        missing: Vec<String>,
        received: usize,
        expected: usize,
    },

    /// A participant delivered two different packets
    #[error("Duplicate peer packet from {participant}")]
    DuplicatePacket { participant: String },

    /// A packet arrived from someone who is not part of the run
    #[error("Peer packet from unexpected participant {participant}")]
    UnexpectedParticipant { participant: String },

    /// A packet is structurally unusable
    #[error("Invalid peer packet from {participant}: {reason}")]
    InvalidPacket { participant: String, reason: String },

    /// The genesis builder rejected the aggregated packets
    #[error("Genesis construction failed: {0}")]
    Genesis(String),

    /// A configurator failed
    #[error("Configuration failed: {0}")]
    Configure(String),

    /// The config set has no slice for this participant
    #[error("No node configuration for participant {0}")]
    MissingNodeConfig(String),

    /// Publishing setup data failed
    #[error("Failed to publish {what}: {reason}")]
    Publish { what: String, reason: String },

    /// A follower never received the network configuration
    #[error("Testground config not received within {}", format_duration(.0))]
    ConfigNotReceived(Duration),
}

/// The predicate a wait was blocked on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// Chain height at least this value
    Height(Height),
    /// A block with a timestamp strictly after this instant
    TimestampAfter(DateTime<Utc>),
    /// Transaction committed within a block budget
    TxIncluded {
        hash: TxHash,
        max_blocks: i64,
        start_height: Height,
    },
    /// The leader's end-of-test command
    EndOfTest,
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::Height(h) => write!(f, "height {}", h),
            WaitCondition::TimestampAfter(t) => write!(f, "block with timestamp after {}", t),
            WaitCondition::TxIncluded {
                hash,
                max_blocks,
                start_height,
            } => write!(
                f,
                "tx {} within {} blocks of height {}",
                hash, max_blocks, start_height
            ),
            WaitCondition::EndOfTest => write!(f, "end-of-test command"),
        }
    }
}

/// Last value seen by a wait before it gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Height(Height),
    Timestamp(DateTime<Utc>),
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Height(h) => write!(f, "height {}", h),
            Observation::Timestamp(t) => write!(f, "timestamp {}", t),
        }
    }
}

/// Budget a wait was given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitLimit {
    /// Wall-clock deadline
    Elapsed(Duration),
    /// Height increments since the call started
    Blocks(i64),
}

impl fmt::Display for WaitLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitLimit::Elapsed(d) => write!(f, "{}", humantime::format_duration(*d)),
            WaitLimit::Blocks(n) => write!(f, "{} blocks", n),
        }
    }
}

/// A bounded wait's deadline elapsed without the condition being met
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("timed out after {limit} waiting for {condition} (last observed: {})", describe(.last_observed))]
pub struct TimeoutError {
    pub condition: WaitCondition,
    pub limit: WaitLimit,
    pub last_observed: Option<Observation>,
}

impl TimeoutError {
    /// Last observed height, if the wait tracked heights
    pub fn last_height(&self) -> Option<Height> {
        match self.last_observed {
            Some(Observation::Height(h)) => Some(h),
            _ => None,
        }
    }
}

fn format_duration(d: &Duration) -> String {
    humantime::format_duration(*d).to_string()
}

fn describe(observed: &Option<Observation>) -> String {
    match observed {
        Some(o) => o.to_string(),
        None => "nothing".to_string(),
    }
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_condition_and_last_height() {
        let err = HarnessError::from(TimeoutError {
            condition: WaitCondition::Height(12),
            limit: WaitLimit::Elapsed(Duration::from_secs(30)),
            last_observed: Some(Observation::Height(11)),
        });

        let msg = err.to_string();
        assert!(msg.contains("height 12"), "{}", msg);
        assert!(msg.contains("last observed: height 11"), "{}", msg);
        assert!(err.is_timeout());
        assert!(!err.is_transient());
        assert_eq!(err.as_timeout().and_then(|t| t.last_height()), Some(11));
    }

    #[test]
    fn test_missing_packets_lists_participants() {
        let err = BootstrapError::MissingPackets {
            missing: vec!["follower-2".into(), "follower-3".into()],
            received: 2,
            expected: 4,
        };
        assert_eq!(
            err.to_string(),
            "2/4 peer packets received; missing: follower-2, follower-3"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(HarnessError::Query("down".into()).is_transient());
        assert!(HarnessError::NotFound("tx".into()).is_transient());
        assert!(!HarnessError::Cancelled.is_transient());
        assert!(HarnessError::Cancelled.is_cancelled());
    }
}
