//! Follower-side load generation
//!
//! One round of transactions is submitted per committed block, for the
//! duration carried in the `StartLoad` command.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ledgerlab_core::{
    BroadcastMode, HarnessError, LedgerHandle, LoadParams, TxFactory, NEW_BLOCK_QUERY,
};

use crate::wait::{deadline_after, until};

/// Block notifications buffered for the generator
const LOAD_BUFFER: usize = 16;

/// Totals for one load run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rounds: usize,
    /// Accepted by the ledger
    pub submitted: usize,
    /// Answered with a non-zero code
    pub rejected: usize,
    /// Transport or factory failures
    pub failed: usize,
}

/// Handle to a running load generator
#[derive(Debug)]
pub struct LoadGenerator {
    name: String,
    cancel: CancellationToken,
    task: JoinHandle<LoadStats>,
}

impl LoadGenerator {
    pub fn spawn(
        params: LoadParams,
        ledger: LedgerHandle,
        txs: Arc<dyn TxFactory>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let name = params.name.clone();
        let task = tokio::spawn(generate(params, ledger, txs, cancel.clone()));
        Self { name, cancel, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop submitting and return the totals
    pub async fn stop(self) -> LoadStats {
        self.cancel.cancel();
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(load = %self.name, "Load generator task failed: {}", e);
                LoadStats::default()
            }
        }
    }
}

async fn generate(
    params: LoadParams,
    ledger: LedgerHandle,
    txs: Arc<dyn TxFactory>,
    cancel: CancellationToken,
) -> LoadStats {
    let mut stats = LoadStats::default();
    let deadline = deadline_after(params.duration);

    let mut blocks = match ledger.blocks.subscribe(NEW_BLOCK_QUERY, LOAD_BUFFER).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(load = %params.name, "Load generator could not subscribe: {}", e);
            return stats;
        }
    };
    info!(
        load = %params.name,
        txs_per_round = params.tx_sizes.len(),
        duration = %humantime::format_duration(params.duration),
        "Load started"
    );

    loop {
        let height = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = until(deadline) => break,
            event = blocks.recv() => match event {
                Some(event) => event.height,
                None => {
                    warn!(load = %params.name, "Block stream ended");
                    break;
                }
            },
        };

        stats.rounds += 1;
        for &size in &params.tx_sizes {
            if cancel.is_cancelled() {
                break;
            }
            let tx = match txs.random_tx(size) {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(size, "Could not build transaction: {}", e);
                    stats.failed += 1;
                    continue;
                }
            };
            match ledger.broadcaster.broadcast(&tx, BroadcastMode::Sync).await {
                Ok(resp) => match resp.into_result() {
                    Ok(_) => stats.submitted += 1,
                    Err(HarnessError::Broadcast { code, log }) => {
                        debug!(code, log = %log, "Transaction rejected");
                        stats.rejected += 1;
                    }
                    Err(_) => stats.failed += 1,
                },
                Err(e) => {
                    debug!("Broadcast failed: {}", e);
                    stats.failed += 1;
                }
            }
        }
        debug!(height, submitted = stats.submitted, "Load round complete");
    }

    info!(
        load = %params.name,
        rounds = stats.rounds,
        submitted = stats.submitted,
        rejected = stats.rejected,
        failed = stats.failed,
        "Load stopped"
    );
    stats
}
