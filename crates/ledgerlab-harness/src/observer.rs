//! Background block observer
//!
//! Records `(height, size)` for every block-committed notification into its
//! own append-only log. It runs as an independent task with its own
//! cancellation token; subscription or stream failures end the task and are
//! logged, never propagated.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ledgerlab_core::{BlockCommitted, BlockSubscriber, Height, NEW_BLOCK_QUERY};

/// Notifications buffered between the subscription and the observer task
pub const OBSERVER_BUFFER: usize = 10;

/// One block as seen by the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockObservation {
    pub height: Height,
    pub size: usize,
    pub time: DateTime<Utc>,
}

impl From<BlockCommitted> for BlockObservation {
    fn from(event: BlockCommitted) -> Self {
        Self {
            height: event.height,
            size: event.size,
            time: event.time,
        }
    }
}

/// Append-only observation log, readable while the observer runs
#[derive(Debug, Clone, Default)]
pub struct ObservationLog {
    entries: Arc<RwLock<Vec<BlockObservation>>>,
}

impl ObservationLog {
    fn append(&self, observation: BlockObservation) {
        self.entries.write().push(observation);
    }

    pub fn snapshot(&self) -> Vec<BlockObservation> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest observed block, if any
    pub fn largest(&self) -> Option<BlockObservation> {
        self.entries.read().iter().copied().max_by_key(|o| o.size)
    }
}

/// Handle to a running observer task
#[derive(Debug)]
pub struct BlockObserver {
    log: ObservationLog,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl BlockObserver {
    /// Subscribe to committed blocks and start recording
    ///
    /// The observer's token is a child of `parent`, so cancelling the run
    /// stops it as well.
    pub fn spawn(blocks: Arc<dyn BlockSubscriber>, parent: &CancellationToken) -> Self {
        let log = ObservationLog::default();
        let cancel = parent.child_token();

        let task = tokio::spawn(observe(blocks, log.clone(), cancel.clone()));

        Self { log, cancel, task }
    }

    pub fn log(&self) -> &ObservationLog {
        &self.log
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the task, wait for it, and return everything it recorded
    pub async fn stop(self) -> Vec<BlockObservation> {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Block observer task failed: {}", e);
        }
        self.log.snapshot()
    }
}

async fn observe(blocks: Arc<dyn BlockSubscriber>, log: ObservationLog, cancel: CancellationToken) {
    let mut events = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        sub = blocks.subscribe(NEW_BLOCK_QUERY, OBSERVER_BUFFER) => match sub {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Block observer could not subscribe: {}", e);
                return;
            }
        },
    };
    info!("Block observer started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => {
                    debug!(height = event.height, size = event.size, "Observed block");
                    log.append(event.into());
                }
                None => {
                    warn!("Block event stream ended");
                    break;
                }
            },
        }
    }

    info!(blocks = log.len(), "Block observer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SimulatedChain;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_observer_records_committed_blocks() {
        let chain = SimulatedChain::with_height(Duration::from_secs(1), 2);
        let root = CancellationToken::new();
        let observer = BlockObserver::spawn(Arc::new(chain.clone()), &root);
        tokio::time::sleep(Duration::from_millis(10)).await;

        chain.commit_blocks(3);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let heights: Vec<_> = observer.log().snapshot().iter().map(|o| o.height).collect();
        assert_eq!(heights, vec![3, 4, 5]);
        assert!(observer.is_running());

        let observed = observer.stop().await;
        assert_eq!(observed.len(), 3);
        // Stopped observer records nothing further
        chain.commit_blocks(1);
        assert_eq!(observed.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_observer() {
        let chain = SimulatedChain::with_height(Duration::from_secs(1), 1);
        let root = CancellationToken::new();
        let observer = BlockObserver::spawn(Arc::new(chain.clone()), &root);
        tokio::time::sleep(Duration::from_millis(10)).await;

        root.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!observer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_failure_is_not_fatal() {
        let chain = SimulatedChain::with_height(Duration::from_secs(1), 1);
        chain.set_reachable(false);
        let observer = BlockObserver::spawn(Arc::new(chain.clone()), &CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!observer.is_running());
        assert!(observer.stop().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_largest_block() {
        let chain = SimulatedChain::with_height(Duration::from_secs(1), 0);
        let observer = BlockObserver::spawn(Arc::new(chain.clone()), &CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(10)).await;

        chain.commit_block();
        chain.submit(ledgerlab_core::SignedTx(vec![0; 5000]));
        chain.commit_block();
        chain.commit_block();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let largest = observer.log().largest().unwrap();
        assert_eq!(largest.height, 2);
        observer.stop().await;
    }
}
