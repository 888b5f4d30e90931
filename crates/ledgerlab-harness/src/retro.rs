//! Post-run summary statistics

use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use ledgerlab_core::{Height, Result};

use crate::observer::BlockObservation;
use crate::wait::ChainWaiter;

/// What a participant learned about the chain after the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetroReport {
    pub participant: String,
    /// Latest height when the scan started
    pub final_height: Height,
    pub blocks_scanned: usize,
    pub max_block_size: usize,
    pub max_block_height: Height,
    pub total_bytes: usize,
    #[serde(with = "humantime_serde")]
    pub average_block_interval: Option<Duration>,
    /// Blocks recorded by the background observer
    pub observed_blocks: usize,
    pub observed_max_block_size: usize,
    /// Set when the scan stopped early; the other fields cover what was read
    pub scan_error: Option<String>,
}

impl RetroReport {
    pub fn new(participant: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            ..Default::default()
        }
    }

    /// Fold in what the block observer recorded
    pub fn with_observations(mut self, observations: &[BlockObservation]) -> Self {
        self.observed_blocks = observations.len();
        self.observed_max_block_size = observations.iter().map(|o| o.size).max().unwrap_or(0);
        self
    }
}

/// Query every block from height 1 to the latest
///
/// A failing query ends the scan; the report keeps the partial totals and
/// the error message.
pub async fn scan_chain(waiter: &ChainWaiter, participant: &str) -> Result<RetroReport> {
    let mut report = RetroReport::new(participant);
    report.final_height = waiter.latest_height().await?;

    let mut first_time = None;
    let mut last_time = None;
    for height in 1..=report.final_height {
        let block = match waiter.block(Some(height)).await {
            Ok(block) => block,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(height, "Retro scan stopped: {}", e);
                report.scan_error = Some(e.to_string());
                break;
            }
        };

        report.blocks_scanned += 1;
        report.total_bytes += block.size;
        if block.size > report.max_block_size {
            report.max_block_size = block.size;
            report.max_block_height = block.height;
        }
        first_time.get_or_insert(block.time);
        last_time = Some(block.time);
    }

    if let (Some(first), Some(last)) = (first_time, last_time) {
        if report.blocks_scanned > 1 {
            let span = (last - first).to_std().unwrap_or_default();
            report.average_block_interval = Some(span / (report.blocks_scanned as u32 - 1));
        }
    }

    info!(
        participant,
        final_height = report.final_height,
        max_block_size = report.max_block_size,
        max_block_height = report.max_block_height,
        total_bytes = report.total_bytes,
        "Retro scan complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{SimulatedChain, BLOCK_HEADER_SIZE};
    use ledgerlab_core::SignedTx;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn waiter(chain: &SimulatedChain) -> ChainWaiter {
        ChainWaiter::new(Arc::new(chain.clone()), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_scan_finds_largest_block() {
        let chain = SimulatedChain::with_height(Duration::from_secs(2), 3);
        chain.submit(SignedTx(vec![0; 1000]));
        chain.submit(SignedTx(vec![1; 1000]));
        chain.commit_blocks(2);

        let report = scan_chain(&waiter(&chain), "leader").await.unwrap();
        assert_eq!(report.final_height, 5);
        assert_eq!(report.blocks_scanned, 5);
        assert_eq!(report.max_block_height, 4);
        assert_eq!(report.max_block_size, BLOCK_HEADER_SIZE + 2000);
        assert_eq!(report.total_bytes, 5 * BLOCK_HEADER_SIZE + 2000);
        assert_eq!(report.average_block_interval, Some(Duration::from_secs(2)));
        assert_eq!(report.scan_error, None);
    }

    #[tokio::test]
    async fn test_pruned_history_is_reported_not_raised() {
        let chain = SimulatedChain::with_height(Duration::from_secs(2), 4);
        chain.set_pruned_below(3);

        let report = scan_chain(&waiter(&chain), "follower-0").await.unwrap();
        assert_eq!(report.final_height, 4);
        assert_eq!(report.blocks_scanned, 0);
        assert!(report.scan_error.as_deref().unwrap().contains("block 1"));
    }

    #[tokio::test]
    async fn test_unreachable_chain_fails_scan() {
        let chain = SimulatedChain::with_height(Duration::from_secs(2), 4);
        chain.set_reachable(false);
        let err = scan_chain(&waiter(&chain), "leader").await.unwrap_err();
        assert!(matches!(err, ledgerlab_core::HarnessError::Query(_)));
    }

    #[test]
    fn test_report_serializes_interval_as_human_time() {
        let report = RetroReport {
            average_block_interval: Some(Duration::from_secs(6)),
            ..RetroReport::new("leader")
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["average_block_interval"], "6s");
        assert_eq!(json["participant"], "leader");
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = SimulatedChain::new(Duration::from_secs(1));
        let report = scan_chain(&waiter(&chain), "leader").await.unwrap();
        assert_eq!(report.blocks_scanned, 0);
        assert_eq!(report.average_block_interval, None);
    }

    #[test]
    fn test_observations_are_merged() {
        let now = chrono::Utc::now();
        let observations = vec![
            BlockObservation { height: 3, size: 10, time: now },
            BlockObservation { height: 4, size: 30, time: now },
        ];
        let report = RetroReport::new("leader").with_observations(&observations);
        assert_eq!(report.observed_blocks, 2);
        assert_eq!(report.observed_max_block_size, 30);
    }
}
