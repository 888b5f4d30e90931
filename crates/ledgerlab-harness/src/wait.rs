//! Condition-wait primitives over a ledger query client
//!
//! Every wait polls on a fixed interval rather than subscribing to block
//! events: a block committed before a subscription attaches would be missed,
//! while a poll always observes current state. Each poll is bounded by the
//! I/O timeout, transient query failures are logged and retried, and the
//! caller's cancellation token wins over every other outcome.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ledgerlab_core::{
    BlockInfo, HarnessError, Height, LedgerQuery, Observation, Result, TimeoutError, TxHash,
    TxResult, WaitCondition, WaitConfig, WaitLimit,
};

/// Why a poll loop stopped before its condition held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    Deadline,
}

/// Polling waits against one ledger
#[derive(Clone)]
pub struct ChainWaiter {
    ledger: Arc<dyn LedgerQuery>,
    cancel: CancellationToken,
    config: WaitConfig,
}

impl ChainWaiter {
    pub fn new(ledger: Arc<dyn LedgerQuery>, cancel: CancellationToken) -> Self {
        Self {
            ledger,
            cancel,
            config: WaitConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WaitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Latest committed height
    pub async fn latest_height(&self) -> Result<Height> {
        self.io(self.ledger.height()).await
    }

    /// Timestamp of the latest block
    pub async fn latest_timestamp(&self) -> Result<DateTime<Utc>> {
        Ok(self.io(self.ledger.block(None)).await?.time)
    }

    /// Timestamp of block 1
    pub async fn genesis_time(&self) -> Result<DateTime<Utc>> {
        Ok(self.block(Some(1)).await?.time)
    }

    /// One block query, bounded like every other query
    pub async fn block(&self, height: Option<Height>) -> Result<BlockInfo> {
        self.io(self.ledger.block(height)).await
    }

    /// Block until the chain reaches `target`, returning the height observed
    pub async fn wait_for_height(&self, target: Height, limit: Duration) -> Result<Height> {
        let deadline = deadline_after(limit);
        let mut ticker = self.ticker();
        let mut observed: Option<Height> = None;

        let timed_out = |observed: Option<Height>| {
            HarnessError::from(TimeoutError {
                condition: WaitCondition::Height(target),
                limit: WaitLimit::Elapsed(limit),
                last_observed: observed.map(Observation::Height),
            })
        };

        loop {
            match self.next_poll(&mut ticker, deadline).await {
                Some(Interrupt::Cancelled) => return Err(HarnessError::Cancelled),
                Some(Interrupt::Deadline) => return Err(timed_out(observed)),
                None => {}
            }

            match self.probe(deadline, self.ledger.height()).await {
                Err(Interrupt::Cancelled) => return Err(HarnessError::Cancelled),
                Err(Interrupt::Deadline) => return Err(timed_out(observed)),
                Ok(Ok(height)) => {
                    let height = observed.map_or(height, |prev| prev.max(height));
                    observed = Some(height);
                    if height >= target {
                        return Ok(height);
                    }
                    debug!(height, target, "Waiting for height");
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!(target, "Height query failed, retrying: {}", e);
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// Block until the latest block's timestamp is strictly after `target`
    pub async fn wait_for_timestamp(
        &self,
        target: DateTime<Utc>,
        limit: Duration,
    ) -> Result<DateTime<Utc>> {
        let deadline = deadline_after(limit);
        let mut ticker = self.ticker();
        let mut observed: Option<DateTime<Utc>> = None;

        let timed_out = |observed: Option<DateTime<Utc>>| {
            HarnessError::from(TimeoutError {
                condition: WaitCondition::TimestampAfter(target),
                limit: WaitLimit::Elapsed(limit),
                last_observed: observed.map(Observation::Timestamp),
            })
        };

        loop {
            match self.next_poll(&mut ticker, deadline).await {
                Some(Interrupt::Cancelled) => return Err(HarnessError::Cancelled),
                Some(Interrupt::Deadline) => return Err(timed_out(observed)),
                None => {}
            }

            match self.probe(deadline, self.ledger.block(None)).await {
                Err(Interrupt::Cancelled) => return Err(HarnessError::Cancelled),
                Err(Interrupt::Deadline) => return Err(timed_out(observed)),
                Ok(Ok(block)) => {
                    let time = observed.map_or(block.time, |prev| prev.max(block.time));
                    observed = Some(time);
                    if time > target {
                        return Ok(time);
                    }
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!("Block query failed, retrying: {}", e);
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// `wait_for_timestamp` with the timestamp timeout
    pub async fn wait_for_timestamp_default(&self, target: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.wait_for_timestamp(target, self.config.timestamp_timeout)
            .await
    }

    /// Wait for one more block than the current height
    pub async fn wait_for_next_block(&self) -> Result<Height> {
        self.wait_for_blocks(1).await
    }

    /// Wait until `n` blocks past the current height are committed
    pub async fn wait_for_blocks(&self, n: i64) -> Result<Height> {
        let current = self.latest_height().await?;
        self.wait_for_height(current + n, self.config.default_timeout)
            .await
    }

    /// Wait for a transaction to be committed
    ///
    /// Every call is bounded by the default timeout. With `max_blocks > 0`
    /// the wait also gives up on the first poll that observes a height
    /// above `start_height + max_blocks`, where `start_height` is read when
    /// the call begins. Each poll looks up the transaction before reading
    /// the height, so a transaction committed within the budget is returned
    /// even if the chain has moved past the budget by the time it is seen.
    /// With `max_blocks <= 0` only the default timeout applies.
    pub async fn wait_for_tx(&self, hash: &TxHash, max_blocks: i64) -> Result<TxResult> {
        let start_height = self.latest_height().await?;
        let budgeted = max_blocks > 0;
        let deadline = deadline_after(self.config.default_timeout);
        let mut ticker = self.ticker();
        let mut observed: Option<Height> = None;

        let timed_out = |limit: WaitLimit, observed: Option<Height>| {
            HarnessError::from(TimeoutError {
                condition: WaitCondition::TxIncluded {
                    hash: *hash,
                    max_blocks,
                    start_height,
                },
                limit,
                last_observed: observed.map(Observation::Height),
            })
        };
        let elapsed = WaitLimit::Elapsed(self.config.default_timeout);

        loop {
            match self.next_poll(&mut ticker, deadline).await {
                Some(Interrupt::Cancelled) => return Err(HarnessError::Cancelled),
                Some(Interrupt::Deadline) => return Err(timed_out(elapsed, observed)),
                None => {}
            }

            match self.probe(deadline, self.ledger.tx(hash)).await {
                Err(Interrupt::Cancelled) => return Err(HarnessError::Cancelled),
                Err(Interrupt::Deadline) => return Err(timed_out(elapsed, observed)),
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(HarnessError::NotFound(_))) => {}
                Ok(Err(e)) if e.is_transient() => {
                    warn!(%hash, "Tx query failed, retrying: {}", e);
                }
                Ok(Err(e)) => return Err(e),
            }

            if !budgeted {
                continue;
            }

            match self.probe(deadline, self.ledger.height()).await {
                Err(Interrupt::Cancelled) => return Err(HarnessError::Cancelled),
                Err(Interrupt::Deadline) => return Err(timed_out(elapsed, observed)),
                Ok(Ok(height)) => {
                    let height = observed.map_or(height, |prev| prev.max(height));
                    observed = Some(height);
                    if height > start_height + max_blocks {
                        return Err(timed_out(WaitLimit::Blocks(max_blocks), observed));
                    }
                    debug!(%hash, height, start_height, max_blocks, "Tx not yet committed");
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!(%hash, "Height query failed, retrying: {}", e);
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// First height whose block timestamp is strictly after `t`
    ///
    /// Scans every block from height 1 to the latest, one query per block:
    /// O(latest_height) round-trips. Intended for short test chains only.
    pub async fn height_for_timestamp(&self, t: DateTime<Utc>) -> Result<Height> {
        let latest = self.latest_height().await?;
        for height in 1..=latest {
            let block = self.io(self.ledger.block(Some(height))).await?;
            if block.time > t {
                return Ok(height);
            }
        }
        Err(HarnessError::NotFound(format!(
            "no block with timestamp after {}",
            t
        )))
    }

    /// Run one query bounded by the I/O timeout, cancellation first
    async fn io<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.probe(None, fut).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Cancelled),
        }
    }

    /// Race one query against cancellation and the wait deadline
    async fn probe<T>(
        &self,
        deadline: Option<Instant>,
        fut: impl Future<Output = Result<T>>,
    ) -> std::result::Result<Result<T>, Interrupt> {
        let io_timeout = self.config.io_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = until(deadline) => Err(Interrupt::Deadline),
            res = timeout(io_timeout, fut) => Ok(res.unwrap_or_else(|_| {
                Err(HarnessError::Query(format!(
                    "query timed out after {}",
                    humantime::format_duration(io_timeout)
                )))
            })),
        }
    }

    /// Wait for the next poll tick, cancellation first
    async fn next_poll(&self, ticker: &mut Interval, deadline: Option<Instant>) -> Option<Interrupt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Some(Interrupt::Cancelled),
            _ = until(deadline) => Some(Interrupt::Deadline),
            _ = ticker.tick() => None,
        }
    }

    /// Ticker whose first tick is one interval from now
    fn ticker(&self) -> Interval {
        let period = self.config.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

impl std::fmt::Debug for ChainWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainWaiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Deadline `limit` from now, or none when `limit` is too large to represent
pub(crate) fn deadline_after(limit: Duration) -> Option<Instant> {
    Instant::now().checked_add(limit)
}

/// Sleep until `deadline`, forever when there is none
pub(crate) async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SimulatedChain;
    use ledgerlab_core::{BroadcastMode, SignedTx, TxBroadcaster};

    fn waiter(chain: &SimulatedChain) -> ChainWaiter {
        ChainWaiter::new(Arc::new(chain.clone()), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_height_never_returns_early() {
        let chain = SimulatedChain::with_height(Duration::from_secs(2), 3);
        let cancel = CancellationToken::new();
        let _producer = chain.spawn_producer(cancel.clone());

        let reached = waiter(&chain)
            .wait_for_height(8, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(reached >= 8);
        assert!(chain.height() >= 8);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_height_times_out_below_target() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 10);
        let cancel = CancellationToken::new();
        let _producer = chain.spawn_producer(cancel.clone());

        let err = waiter(&chain)
            .wait_for_height(20, Duration::from_secs(15))
            .await
            .unwrap_err();
        let timeout = err.as_timeout().expect("expected a timeout");
        assert_eq!(timeout.condition, WaitCondition::Height(20));
        let last = timeout.last_height().expect("a height was observed");
        assert!(last < 20);
        assert_eq!(last, 12);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_height_already_reached_returns_on_first_poll() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 5);
        let start = Instant::now();
        let reached = waiter(&chain)
            .wait_for_height(3, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(reached, 5);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 5);
        chain.fail_next_queries(3);

        let reached = waiter(&chain)
            .wait_for_height(5, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(reached, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_node_times_out_with_nothing_observed() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 5);
        chain.set_reachable(false);

        let err = waiter(&chain)
            .wait_for_height(6, Duration::from_secs(5))
            .await
            .unwrap_err();
        let timeout = err.as_timeout().unwrap();
        assert_eq!(timeout.last_observed, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_beats_deadline() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let waiter = ChainWaiter::new(Arc::new(chain.clone()), cancel);
        // Deadline already elapsed as well; cancellation must still win
        let err = waiter
            .wait_for_height(100, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_a_running_wait() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 1);
        let cancel = CancellationToken::new();
        let waiter = ChainWaiter::new(Arc::new(chain.clone()), cancel.clone());

        let task = tokio::spawn(async move { waiter.wait_for_height(100, Duration::from_secs(600)).await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_query_is_bounded_by_io_timeout() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 4);
        chain.set_query_delay(Duration::from_secs(120));

        let config = WaitConfig {
            io_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let err = waiter(&chain)
            .with_config(config)
            .latest_height()
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Query(_)), "{:?}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_timestamp_is_strictly_after() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 4);
        let cancel = CancellationToken::new();
        let _producer = chain.spawn_producer(cancel.clone());
        let waiter = waiter(&chain);

        let now = waiter.latest_timestamp().await.unwrap();
        let seen = waiter
            .wait_for_timestamp(now, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(seen > now);
        assert!(chain.height() >= 5);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_timestamp_times_out_when_chain_stalls() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 4);
        let waiter = waiter(&chain);
        let now = waiter.latest_timestamp().await.unwrap();

        let err = waiter.wait_for_timestamp_default(now).await.unwrap_err();
        let timeout = err.as_timeout().unwrap();
        assert_eq!(timeout.last_observed, Some(Observation::Timestamp(now)));
        assert_eq!(timeout.limit, WaitLimit::Elapsed(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_blocks_from_height_ten() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 10);
        let cancel = CancellationToken::new();
        let _producer = chain.spawn_producer(cancel.clone());

        let start = Instant::now();
        let reached = waiter(&chain).wait_for_blocks(2).await.unwrap();
        let elapsed = start.elapsed();

        assert!(reached >= 12);
        assert!(elapsed >= Duration::from_secs(12), "{:?}", elapsed);
        assert!(elapsed <= Duration::from_secs(14), "{:?}", elapsed);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_next_block() {
        let chain = SimulatedChain::with_height(Duration::from_secs(3), 7);
        let cancel = CancellationToken::new();
        let _producer = chain.spawn_producer(cancel.clone());

        assert_eq!(waiter(&chain).wait_for_next_block().await.unwrap(), 8);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_blocks_propagates_initial_query_failure() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 10);
        chain.set_reachable(false);
        let err = waiter(&chain).wait_for_blocks(2).await.unwrap_err();
        assert!(matches!(err, HarnessError::Query(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tx_finds_committed_tx() {
        let chain = SimulatedChain::with_height(Duration::from_secs(2), 3);
        let cancel = CancellationToken::new();
        let _producer = chain.spawn_producer(cancel.clone());

        let tx = SignedTx(vec![42; 64]);
        let resp = chain.broadcast(&tx, BroadcastMode::Sync).await.unwrap();

        let result = waiter(&chain).wait_for_tx(&resp.hash, 5).await.unwrap();
        assert_eq!(result.hash, tx.hash());
        assert_eq!(result.height, 4);
        assert!(result.is_ok());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tx_block_budget_is_bounded() {
        let chain = SimulatedChain::with_height(Duration::from_secs(2), 10);
        let cancel = CancellationToken::new();
        let _producer = chain.spawn_producer(cancel.clone());

        let hash = TxHash::of(b"never committed");
        let err = waiter(&chain).wait_for_tx(&hash, 5).await.unwrap_err();

        let timeout = err.as_timeout().expect("expected a timeout");
        assert_eq!(timeout.limit, WaitLimit::Blocks(5));
        assert_eq!(
            timeout.condition,
            WaitCondition::TxIncluded { hash, max_blocks: 5, start_height: 10 }
        );
        // Gives up on the first poll past start + budget
        assert_eq!(timeout.last_height(), Some(16));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tx_budget_boundary_is_measured_from_call_start() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 10);
        let hash = TxHash::of(b"late tx");
        let waiter = waiter(&chain);

        let task = {
            let waiter = waiter.clone();
            tokio::spawn(async move { waiter.wait_for_tx(&hash, 5).await })
        };

        // At start + budget the wait is still running
        tokio::time::sleep(Duration::from_millis(10)).await;
        chain.commit_blocks(5);
        assert_eq!(chain.height(), 15);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!task.is_finished());

        // One block past the budget it gives up
        chain.commit_blocks(1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.as_timeout().and_then(|t| t.last_height()), Some(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tx_committed_at_budget_edge_is_found() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 10);
        let tx = SignedTx(vec![7; 32]);
        let waiter = waiter(&chain);

        let task = {
            let waiter = waiter.clone();
            let hash = tx.hash();
            tokio::spawn(async move { waiter.wait_for_tx(&hash, 5).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        chain.commit_blocks(4);
        chain.broadcast(&tx, BroadcastMode::Async).await.unwrap();
        chain.commit_blocks(1);
        // Chain moves past the budget before the next poll
        chain.commit_blocks(3);

        let result = task.await.unwrap().unwrap();
        assert_eq!(result.height, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tx_without_budget_uses_default_timeout() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 10);
        let cancel = CancellationToken::new();
        let _producer = chain.spawn_producer(cancel.clone());

        let start = Instant::now();
        let err = waiter(&chain)
            .wait_for_tx(&TxHash::of(b"missing"), 0)
            .await
            .unwrap_err();
        let timeout = err.as_timeout().unwrap();
        assert_eq!(timeout.limit, WaitLimit::Elapsed(Duration::from_secs(30)));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tx_with_budget_gives_up_when_node_unreachable() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 10);
        let waiter = waiter(&chain);
        let hash = TxHash::of(b"lost");

        let task = {
            let waiter = waiter.clone();
            tokio::spawn(async move { waiter.wait_for_tx(&hash, 5).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        chain.set_reachable(false);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(task.is_finished());
        let err = task.await.unwrap().unwrap_err();
        let timeout = err.as_timeout().expect("expected a timeout");
        assert_eq!(timeout.limit, WaitLimit::Elapsed(Duration::from_secs(30)));
        assert_eq!(timeout.last_observed, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tx_with_budget_gives_up_when_chain_stalls() {
        // No producer: the chain never leaves height 10
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 10);

        let start = Instant::now();
        let err = waiter(&chain)
            .wait_for_tx(&TxHash::of(b"stalled"), 5)
            .await
            .unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_secs(30));
        let timeout = err.as_timeout().expect("expected a timeout");
        assert_eq!(timeout.limit, WaitLimit::Elapsed(Duration::from_secs(30)));
        assert_eq!(timeout.last_height(), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_means_no_deadline() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 5);
        assert!(deadline_after(Duration::MAX).is_none());

        let reached = waiter(&chain)
            .wait_for_height(5, Duration::MAX)
            .await
            .unwrap();
        assert_eq!(reached, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_wait_still_yields_to_cancellation() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 1);
        let cancel = CancellationToken::new();
        let waiter = ChainWaiter::new(Arc::new(chain.clone()), cancel.clone());

        let task = tokio::spawn(async move {
            waiter.wait_for_timestamp(Utc::now() + chrono::Duration::days(365), Duration::MAX).await
        });
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!task.is_finished());
        cancel.cancel();

        assert!(task.await.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_height_for_timestamp_and_genesis_time() {
        let chain = SimulatedChain::with_height(Duration::from_secs(6), 10);
        let waiter = waiter(&chain);

        let genesis = waiter.genesis_time().await.unwrap();
        assert_eq!(genesis, chain.block_time_at(1));

        let t = chain.block_time_at(4);
        assert_eq!(waiter.height_for_timestamp(t).await.unwrap(), 5);

        let err = waiter
            .height_for_timestamp(chain.block_time_at(10))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::NotFound(_)));
    }
}
