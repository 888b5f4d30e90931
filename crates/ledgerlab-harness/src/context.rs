//! State shared by both roles

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ledgerlab_core::{
    ConsensusNode, GenesisDocument, Height, LedgerHandle, NodeConfig, Rendezvous, Result,
    RunParams, WaitConfig,
};

use crate::wait::ChainWaiter;

/// One participant's view of the run
#[derive(Clone)]
pub struct ParticipantContext {
    pub name: String,
    pub params: RunParams,
    pub wait: WaitConfig,
    pub rendezvous: Arc<dyn Rendezvous>,
    pub node: Arc<dyn ConsensusNode>,
    /// Root token for the whole run; every task and wait derives from it
    pub cancel: CancellationToken,
}

impl ParticipantContext {
    pub fn new(
        name: impl Into<String>,
        params: RunParams,
        rendezvous: Arc<dyn Rendezvous>,
        node: Arc<dyn ConsensusNode>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            wait: WaitConfig::default(),
            rendezvous,
            node,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Initialise and start the local node, returning its clients
    pub async fn launch_node(
        &self,
        genesis: &GenesisDocument,
        config: &NodeConfig,
    ) -> Result<LedgerHandle> {
        self.node.init(genesis, config).await?;
        self.node.start().await?;
        info!(participant = %self.name, chain_id = %genesis.chain_id, "Local node started");
        self.node.client()
    }

    pub fn waiter(&self, ledger: &LedgerHandle) -> ChainWaiter {
        ChainWaiter::new(ledger.query.clone(), self.cancel.clone()).with_config(self.wait)
    }

    /// Wait until the local node has produced its first blocks
    pub async fn await_start(&self, waiter: &ChainWaiter) -> Result<Height> {
        let height = waiter
            .wait_for_height(self.params.min_start_height, self.params.local_start_timeout)
            .await?;
        info!(participant = %self.name, height, "Local node is producing blocks");
        Ok(height)
    }
}

impl std::fmt::Debug for ParticipantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantContext")
            .field("name", &self.name)
            .field("chain_id", &self.params.chain_id)
            .finish_non_exhaustive()
    }
}
