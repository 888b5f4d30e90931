//! In-memory stand-ins for the ledger collaborators
//!
//! `SimulatedChain` is a single shared ledger that commits blocks on a tokio
//! interval (or on demand), so every time-driven behaviour can be exercised
//! under a paused clock. Several `SimulatedNode`s may point at one chain to
//! model a cluster whose nodes agree on state.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ledgerlab_core::{
    AccountId, BlockCommitted, BlockInfo, BlockSubscriber, BroadcastMode, BroadcastResponse,
    ChainStatus, ConsensusNode, GenesisDocument, HarnessError, Height, LedgerHandle, LedgerQuery,
    NodeConfig, PacketSource, PeerPacket, PublicKey, Result, SignedTx, TxBroadcaster, TxFactory,
    TxHash, TxResult, CODE_OK,
};

/// Encoded size of a block with no transactions
pub const BLOCK_HEADER_SIZE: usize = 256;

#[derive(Default)]
struct ChainState {
    blocks: Vec<BlockInfo>,
    mempool: Vec<SignedTx>,
    txs: HashMap<TxHash, TxResult>,
    submitted: Vec<SignedTx>,
    subscribers: Vec<mpsc::Sender<BlockCommitted>>,
    reject: Option<(u32, String)>,
}

struct ChainInner {
    genesis_time: DateTime<Utc>,
    block_time: Duration,
    state: Mutex<ChainState>,
    reachable: AtomicBool,
    failures: AtomicUsize,
    pruned_below: AtomicI64,
    query_delay: Mutex<Duration>,
}

/// Shared in-memory ledger
#[derive(Clone)]
pub struct SimulatedChain {
    inner: Arc<ChainInner>,
}

impl SimulatedChain {
    /// Empty chain producing one block per `block_time`
    pub fn new(block_time: Duration) -> Self {
        Self::with_height(block_time, 0)
    }

    /// Chain that has already committed `height` empty blocks
    ///
    /// Block `h` is stamped `genesis + h * block_time`.
    pub fn with_height(block_time: Duration, height: Height) -> Self {
        let chain = Self {
            inner: Arc::new(ChainInner {
                genesis_time: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
                block_time,
                state: Mutex::new(ChainState::default()),
                reachable: AtomicBool::new(true),
                failures: AtomicUsize::new(0),
                pruned_below: AtomicI64::new(0),
                query_delay: Mutex::new(Duration::ZERO),
            }),
        };
        chain.commit_blocks(height.max(0) as usize);
        chain
    }

    /// Timestamp of block `height`
    pub fn block_time_at(&self, height: Height) -> DateTime<Utc> {
        let offset = self.inner.block_time * height.max(0) as u32;
        let offset = chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero());
        self.inner.genesis_time + offset
    }

    pub fn height(&self) -> Height {
        self.inner.state.lock().blocks.len() as Height
    }

    /// Put a transaction in the mempool; it lands in the next block
    pub fn submit(&self, tx: SignedTx) {
        let mut state = self.inner.state.lock();
        state.submitted.push(tx.clone());
        state.mempool.push(tx);
    }

    /// Every transaction accepted by `broadcast` or `submit`
    pub fn submitted(&self) -> Vec<SignedTx> {
        self.inner.state.lock().submitted.clone()
    }

    /// Commit one block holding the current mempool
    pub fn commit_block(&self) -> BlockInfo {
        let mut state = self.inner.state.lock();
        let height = state.blocks.len() as Height + 1;
        let txs = std::mem::take(&mut state.mempool);

        let block = BlockInfo {
            height,
            time: self.block_time_at(height),
            size: BLOCK_HEADER_SIZE + txs.iter().map(SignedTx::len).sum::<usize>(),
            tx_count: txs.len(),
        };
        for tx in &txs {
            let hash = tx.hash();
            state.txs.insert(
                hash,
                TxResult {
                    hash,
                    height,
                    code: CODE_OK,
                    raw_log: String::new(),
                },
            );
        }
        state.blocks.push(block.clone());

        let event = BlockCommitted::from(&block);
        state.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(height, "Block subscriber is lagging, dropping notification");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        debug!(height, txs = block.tx_count, size = block.size, "Committed block");
        block
    }

    pub fn commit_blocks(&self, n: usize) {
        for _ in 0..n {
            self.commit_block();
        }
    }

    /// Commit a block every `block_time` until `cancel` fires
    pub fn spawn_producer(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let chain = self.clone();
        let period = self.inner.block_time;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        chain.commit_block();
                    }
                }
            }
        })
    }

    /// Fail the next `n` queries with a transient error
    pub fn fail_next_queries(&self, n: usize) {
        self.inner.failures.store(n, Ordering::SeqCst);
    }

    /// An unreachable chain fails every query, broadcast and subscription
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Blocks below `height` are no longer served, as on a pruned node
    pub fn set_pruned_below(&self, height: Height) {
        self.inner.pruned_below.store(height, Ordering::SeqCst);
    }

    /// Delay every query by `delay`
    pub fn set_query_delay(&self, delay: Duration) {
        *self.inner.query_delay.lock() = delay;
    }

    /// Answer every following broadcast with `code`
    pub fn reject_broadcasts(&self, code: u32, log: impl Into<String>) {
        self.inner.state.lock().reject = Some((code, log.into()));
    }

    async fn round_trip(&self) -> Result<()> {
        let delay = *self.inner.query_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(HarnessError::Query("connection refused".into()));
        }
        let injected = self
            .inner
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(HarnessError::Query("injected failure".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedChain")
            .field("height", &self.height())
            .field("block_time", &self.inner.block_time)
            .finish()
    }
}

#[async_trait]
impl LedgerQuery for SimulatedChain {
    async fn status(&self) -> Result<ChainStatus> {
        self.round_trip().await?;
        Ok(ChainStatus {
            latest_height: self.height(),
        })
    }

    async fn block(&self, height: Option<Height>) -> Result<BlockInfo> {
        self.round_trip().await?;
        let state = self.inner.state.lock();
        let block = match height {
            None => state.blocks.last(),
            Some(h) if h >= 1 && h >= self.inner.pruned_below.load(Ordering::SeqCst) => {
                state.blocks.get((h - 1) as usize)
            }
            Some(_) => None,
        };
        block.cloned().ok_or_else(|| {
            HarnessError::NotFound(format!(
                "block {}",
                height.map_or_else(|| "latest".to_string(), |h| h.to_string())
            ))
        })
    }

    async fn tx(&self, hash: &TxHash) -> Result<TxResult> {
        self.round_trip().await?;
        self.inner
            .state
            .lock()
            .txs
            .get(hash)
            .cloned()
            .ok_or_else(|| HarnessError::NotFound(format!("tx {}", hash)))
    }
}

#[async_trait]
impl TxBroadcaster for SimulatedChain {
    async fn broadcast(&self, tx: &SignedTx, mode: BroadcastMode) -> Result<BroadcastResponse> {
        self.round_trip().await?;
        let hash = tx.hash();

        let reject = self.inner.state.lock().reject.clone();
        if let Some((code, log)) = reject {
            return Ok(BroadcastResponse {
                code,
                hash,
                raw_log: log,
            });
        }

        self.submit(tx.clone());
        if mode == BroadcastMode::Block {
            self.commit_block();
        }
        Ok(BroadcastResponse {
            code: CODE_OK,
            hash,
            raw_log: String::new(),
        })
    }
}

#[async_trait]
impl BlockSubscriber for SimulatedChain {
    async fn subscribe(&self, query: &str, buffer: usize) -> Result<mpsc::Receiver<BlockCommitted>> {
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(HarnessError::Query("connection refused".into()));
        }
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.inner.state.lock().subscribers.push(tx);
        debug!(query, "Block subscription opened");
        Ok(rx)
    }
}

#[derive(Default)]
struct NodeState {
    running: bool,
    init: Option<(GenesisDocument, NodeConfig)>,
    producer: Option<CancellationToken>,
    stops: usize,
}

/// Node lifecycle over a shared `SimulatedChain`
#[derive(Clone)]
pub struct SimulatedNode {
    name: String,
    chain: SimulatedChain,
    produces: bool,
    fail_start: Arc<AtomicBool>,
    state: Arc<Mutex<NodeState>>,
}

impl SimulatedNode {
    /// Node that only reads the chain; something else produces blocks
    pub fn new(name: impl Into<String>, chain: SimulatedChain) -> Self {
        Self {
            name: name.into(),
            chain,
            produces: false,
            fail_start: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(NodeState::default())),
        }
    }

    /// Node that produces blocks on the chain while it runs
    pub fn producer(name: impl Into<String>, chain: SimulatedChain) -> Self {
        Self {
            produces: true,
            ..Self::new(name, chain)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chain(&self) -> &SimulatedChain {
        &self.chain
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Configuration the node was initialised with
    pub fn init_config(&self) -> Option<NodeConfig> {
        self.state.lock().init.as_ref().map(|(_, c)| c.clone())
    }

    pub fn genesis(&self) -> Option<GenesisDocument> {
        self.state.lock().init.as_ref().map(|(g, _)| g.clone())
    }

    /// Number of `stop` calls, including calls on a stopped node
    pub fn stop_count(&self) -> usize {
        self.state.lock().stops
    }
}

#[async_trait]
impl ConsensusNode for SimulatedNode {
    async fn init(&self, genesis: &GenesisDocument, config: &NodeConfig) -> Result<()> {
        if config.name != self.name {
            return Err(HarnessError::Node(format!(
                "node {} given configuration for {}",
                self.name, config.name
            )));
        }
        self.state.lock().init = Some((genesis.clone(), config.clone()));
        debug!(node = %self.name, chain_id = %genesis.chain_id, "Node initialised");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.init.is_none() {
            return Err(HarnessError::Node(format!("node {} started before init", self.name)));
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(HarnessError::Node(format!("node {} failed to start", self.name)));
        }
        if state.running {
            return Ok(());
        }
        if self.produces {
            let cancel = CancellationToken::new();
            self.chain.spawn_producer(cancel.clone());
            state.producer = Some(cancel);
        }
        state.running = true;
        info!(node = %self.name, "Node started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.stops += 1;
        if let Some(producer) = state.producer.take() {
            producer.cancel();
        }
        if state.running {
            state.running = false;
            info!(node = %self.name, "Node stopped");
        }
        Ok(())
    }

    fn client(&self) -> Result<LedgerHandle> {
        if !self.is_running() {
            return Err(HarnessError::Node(format!("node {} is not running", self.name)));
        }
        Ok(LedgerHandle::from_shared(Arc::new(self.chain.clone())))
    }
}

/// Deterministic per-participant ed25519 keys
///
/// The key for a participant is derived from the SHA-256 of its name, so the
/// same participant always contributes the same packet.
#[derive(Debug, Clone, Default)]
pub struct SimulatedKeyring;

impl SimulatedKeyring {
    pub fn new() -> Self {
        Self
    }

    pub fn signing_key(participant: &str) -> SigningKey {
        let seed: [u8; 32] = Sha256::digest(participant.as_bytes()).into();
        SigningKey::from_bytes(&seed)
    }
}

#[async_trait]
impl PacketSource for SimulatedKeyring {
    async fn peer_packet(&self, participant: &str, chain_id: &str) -> Result<PeerPacket> {
        let key = Self::signing_key(participant);
        let public_key = PublicKey::from_bytes(key.verifying_key().as_bytes())?;
        let account = AccountId::from_public_key(&public_key);

        let mut bootstrap_tx = format!("{}:create-validator:{}", chain_id, account).into_bytes();
        let signature = key.sign(&bootstrap_tx);
        bootstrap_tx.extend_from_slice(&signature.to_bytes());

        Ok(PeerPacket::new(
            participant,
            vec![public_key],
            vec![account],
            bootstrap_tx,
        ))
    }
}

/// Transactions of random bytes
#[derive(Debug, Clone, Default)]
pub struct RandomTxFactory;

impl TxFactory for RandomTxFactory {
    fn random_tx(&self, size: usize) -> Result<SignedTx> {
        if size == 0 {
            return Err(HarnessError::Config("transaction size must be positive".into()));
        }
        let mut bytes = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut bytes);
        Ok(SignedTx(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    #[tokio::test(start_paused = true)]
    async fn test_producer_commits_on_interval() {
        let chain = SimulatedChain::new(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let producer = chain.spawn_producer(cancel.clone());

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(chain.height(), 3);

        cancel.cancel();
        producer.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(chain.height(), 3);
    }

    #[tokio::test]
    async fn test_block_mode_commits_immediately() {
        let chain = SimulatedChain::with_height(Duration::from_secs(1), 2);
        let tx = SignedTx(vec![1; 100]);
        chain.broadcast(&tx, BroadcastMode::Block).await.unwrap();

        let result = chain.tx(&tx.hash()).await.unwrap();
        assert_eq!(result.height, 3);
        let block = chain.block(Some(3)).await.unwrap();
        assert_eq!(block.size, BLOCK_HEADER_SIZE + 100);
        assert_eq!(block.tx_count, 1);
    }

    #[tokio::test]
    async fn test_rejected_broadcast_is_not_submitted() {
        let chain = SimulatedChain::new(Duration::from_secs(1));
        chain.reject_broadcasts(19, "tx already in mempool");

        let resp = chain
            .broadcast(&SignedTx(vec![1]), BroadcastMode::Sync)
            .await
            .unwrap();
        assert_eq!(resp.code, 19);
        assert!(resp.into_result().is_err());
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_node_lifecycle() {
        let chain = SimulatedChain::new(Duration::from_secs(1));
        let node = SimulatedNode::new("follower-0", chain);
        assert!(node.start().await.is_err());
        assert!(node.client().is_err());

        let genesis = ledgerlab_core::GenesisDocument {
            chain_id: "chain".into(),
            genesis_time: Utc::now(),
            validators: vec![],
            funded_accounts: vec![],
            bootstrap_txs: vec![],
        };
        let config = NodeConfig::new("follower-0", ledgerlab_core::NodeRole::Follower);
        node.init(&genesis, &config).await.unwrap();
        node.start().await.unwrap();
        assert!(node.client().is_ok());

        node.stop().await.unwrap();
        node.stop().await.unwrap();
        assert!(!node.is_running());
        assert_eq!(node.stop_count(), 2);
    }

    #[tokio::test]
    async fn test_keyring_packets_are_stable_and_signed() {
        let keyring = SimulatedKeyring::new();
        let a = keyring.peer_packet("follower-0", "chain").await.unwrap();
        let b = keyring.peer_packet("follower-0", "chain").await.unwrap();
        let c = keyring.peer_packet("follower-1", "chain").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a.public_keys, c.public_keys);
        assert!(a.validate().is_ok());

        let (message, sig) = a.signed_bootstrap_tx.split_at(a.signed_bootstrap_tx.len() - 64);
        let signature = Signature::from_slice(sig).unwrap();
        SimulatedKeyring::signing_key("follower-0")
            .verifying_key()
            .verify(message, &signature)
            .unwrap();
    }

    #[test]
    fn test_random_tx_sizes() {
        let factory = RandomTxFactory;
        assert_eq!(factory.random_tx(512).unwrap().len(), 512);
        assert!(factory.random_tx(0).is_err());
    }
}
