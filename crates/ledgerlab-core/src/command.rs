//! Leader-issued lifecycle commands

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for a follower's load generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadParams {
    /// Label used in logs
    pub name: String,
    /// How long to keep submitting
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Sizes of the transactions submitted each round
    pub tx_sizes: Vec<usize>,
}

/// What a command asks followers to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    StartLoad(LoadParams),
    EndTest,
}

/// A broadcast instruction from the leader
///
/// Delivery is at-least-once; followers act on each `id` only once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: u64,
    pub kind: CommandKind,
}

impl Command {
    pub fn start_load(id: u64, params: LoadParams) -> Self {
        Self {
            id,
            kind: CommandKind::StartLoad(params),
        }
    }

    pub fn end_test(id: u64) -> Self {
        Self {
            id,
            kind: CommandKind::EndTest,
        }
    }

    pub fn is_end_test(&self) -> bool {
        matches!(self.kind, CommandKind::EndTest)
    }
}
