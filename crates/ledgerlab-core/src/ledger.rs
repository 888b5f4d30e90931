//! Collaborator interfaces the harness drives
//!
//! The harness never talks to a ledger implementation directly. Nodes, query
//! clients, genesis construction and key material are all reached through
//! these traits so that a run can be pointed at real node processes or at an
//! in-memory simulation.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::NodeConfig;
use crate::genesis::GenesisDocument;
use crate::packet::PeerPacket;
use crate::types::{
    AccountId, BlockCommitted, BlockInfo, BroadcastMode, BroadcastResponse, ChainStatus, Height,
    PublicKey, SignedTx, TxHash, TxResult,
};
use crate::Result;

/// Event query selecting every committed block
pub const NEW_BLOCK_QUERY: &str = "tm.event = 'NewBlock'";

/// Read access to ledger state
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Node status
    async fn status(&self) -> Result<ChainStatus>;

    /// Latest committed height
    async fn height(&self) -> Result<Height> {
        Ok(self.status().await?.latest_height)
    }

    /// Block at `height`, or the latest block for `None`
    async fn block(&self, height: Option<Height>) -> Result<BlockInfo>;

    /// Look up a committed transaction. `NotFound` while it is uncommitted.
    async fn tx(&self, hash: &TxHash) -> Result<TxResult>;
}

/// Transaction submission
#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    async fn broadcast(&self, tx: &SignedTx, mode: BroadcastMode) -> Result<BroadcastResponse>;
}

/// Block-committed event stream
#[async_trait]
pub trait BlockSubscriber: Send + Sync {
    /// Subscribe to events matching `query`. The channel holds at most
    /// `buffer` undelivered notifications.
    async fn subscribe(&self, query: &str, buffer: usize) -> Result<mpsc::Receiver<BlockCommitted>>;
}

/// Genesis construction
pub trait GenesisBuilder: Send + Sync {
    fn build_genesis(
        &self,
        chain_id: &str,
        bootstrap_txs: Vec<Vec<u8>>,
        accounts: Vec<AccountId>,
        pubkeys: Vec<PublicKey>,
    ) -> Result<GenesisDocument>;
}

/// Client handles for one running node
#[derive(Clone)]
pub struct LedgerHandle {
    pub query: Arc<dyn LedgerQuery>,
    pub broadcaster: Arc<dyn TxBroadcaster>,
    pub blocks: Arc<dyn BlockSubscriber>,
}

impl LedgerHandle {
    /// Use one value for every interface
    pub fn from_shared<T>(inner: Arc<T>) -> Self
    where
        T: LedgerQuery + TxBroadcaster + BlockSubscriber + 'static,
    {
        Self {
            query: inner.clone(),
            broadcaster: inner.clone(),
            blocks: inner,
        }
    }
}

impl std::fmt::Debug for LedgerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHandle").finish_non_exhaustive()
    }
}

/// Lifecycle of the local consensus node
#[async_trait]
pub trait ConsensusNode: Send + Sync {
    /// Write genesis and this node's configuration
    async fn init(&self, genesis: &GenesisDocument, config: &NodeConfig) -> Result<()>;

    async fn start(&self) -> Result<()>;

    /// Stop the node. Stopping a node that is not running is not an error.
    async fn stop(&self) -> Result<()>;

    /// Clients for the running node
    fn client(&self) -> Result<LedgerHandle>;
}

/// Produces a follower's bootstrap contribution
#[async_trait]
pub trait PacketSource: Send + Sync {
    async fn peer_packet(&self, participant: &str, chain_id: &str) -> Result<PeerPacket>;
}

/// Produces load transactions
pub trait TxFactory: Send + Sync {
    fn random_tx(&self, size: usize) -> Result<SignedTx>;
}
