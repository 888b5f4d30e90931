//! Leader role: bootstrap orchestration, run control and retro scan
//!
//! Plan runs Collect, Genesis, Configure, Publish and Local Start in that
//! order. Any failure there aborts the run. Execute issues the load and
//! end-of-test commands; Retro scans the chain and stops the local node.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

use ledgerlab_core::{
    BootstrapError, Command, GenesisBuilder, HarnessError, LedgerHandle, Result, TestgroundConfig,
};
use ledgerlab_protocol::{COMMANDS, PEER_PACKETS, TESTGROUND_CONFIG};

use crate::bootstrap::{build_genesis, collect_packets};
use crate::configure::{apply_all, Configurator};
use crate::context::ParticipantContext;
use crate::observer::{BlockObserver, ObservationLog};
use crate::retro::{scan_chain, RetroReport};
use crate::wait::ChainWaiter;

pub struct Leader {
    ctx: ParticipantContext,
    genesis_builder: Arc<dyn GenesisBuilder>,
    configurators: Vec<Box<dyn Configurator>>,
    testground: Option<TestgroundConfig>,
    ledger: Option<LedgerHandle>,
    waiter: Option<ChainWaiter>,
    observer: Option<BlockObserver>,
    next_command_id: u64,
}

impl Leader {
    pub fn new(ctx: ParticipantContext, genesis_builder: Arc<dyn GenesisBuilder>) -> Self {
        Self {
            ctx,
            genesis_builder,
            configurators: Vec::new(),
            testground: None,
            ledger: None,
            waiter: None,
            observer: None,
            next_command_id: 1,
        }
    }

    /// Append a configurator; configurators run in the order added
    pub fn with_configurator(mut self, configurator: Box<dyn Configurator>) -> Self {
        self.configurators.push(configurator);
        self
    }

    pub fn with_configurators(
        mut self,
        configurators: impl IntoIterator<Item = Box<dyn Configurator>>,
    ) -> Self {
        self.configurators.extend(configurators);
        self
    }

    pub fn name(&self) -> &str {
        &self.ctx.name
    }

    pub fn context(&self) -> &ParticipantContext {
        &self.ctx
    }

    /// The published configuration, once Configure has run
    pub fn testground_config(&self) -> Option<&TestgroundConfig> {
        self.testground.as_ref()
    }

    pub fn ledger(&self) -> Option<&LedgerHandle> {
        self.ledger.as_ref()
    }

    /// Live view of the block observer's log
    pub fn observations(&self) -> Option<&ObservationLog> {
        self.observer.as_ref().map(BlockObserver::log)
    }

    pub async fn plan(&mut self) -> Result<()> {
        let params = &self.ctx.params;
        params.validate()?;

        // Collect
        let mut packets = ledgerlab_protocol::subscribe(&*self.ctx.rendezvous, PEER_PACKETS).await?;
        info!(
            participant = %self.ctx.name,
            expected = params.followers.len(),
            "Collecting peer packets"
        );
        let packets = collect_packets(
            &mut packets,
            params.followers.iter().cloned(),
            params.setup_timeout,
            &self.ctx.cancel,
        )
        .await?;

        // Genesis
        let genesis = build_genesis(&*self.genesis_builder, &params.chain_id, &packets)?;
        info!(
            chain_id = %genesis.chain_id,
            validators = genesis.validators.len(),
            accounts = genesis.funded_accounts.len(),
            "Genesis built"
        );

        // Configure
        let base = TestgroundConfig::derive(params, genesis, &packets);
        let config = apply_all(base, &self.configurators)?;

        // Publish
        ledgerlab_protocol::publish(&*self.ctx.rendezvous, TESTGROUND_CONFIG, &config)
            .await
            .map_err(|e| match e {
                HarnessError::Cancelled => e,
                e => BootstrapError::Publish {
                    what: "testground config".into(),
                    reason: e.to_string(),
                }
                .into(),
            })?;
        info!(nodes = config.nodes.len(), "Testground config published");

        // Local start
        let node_config = config.node(&self.ctx.name)?.clone();
        let genesis = config.genesis.clone();
        self.testground = Some(config);

        let ledger = self.ctx.launch_node(&genesis, &node_config).await?;
        self.observer = Some(BlockObserver::spawn(ledger.blocks.clone(), &self.ctx.cancel));
        let waiter = self.ctx.waiter(&ledger);
        self.ledger = Some(ledger);
        self.ctx.await_start(&waiter).await?;
        self.waiter = Some(waiter);
        Ok(())
    }

    pub async fn execute(&mut self) -> Result<()> {
        let waiter = self
            .waiter
            .clone()
            .ok_or_else(|| HarnessError::Phase("leader executed before plan completed".into()))?;
        let params = self.ctx.params.clone();

        if !params.warmup.is_zero() {
            info!(warmup = %humantime::format_duration(params.warmup), "Warming up");
            tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => return Err(HarnessError::Cancelled),
                _ = sleep(params.warmup) => {}
            }
        }

        let run = async {
            let start = Command::start_load(self.next_id(), params.load_params());
            self.send(&start).await?;
            let reached = waiter
                .wait_for_height(params.halt_height, params.execution_timeout)
                .await?;
            info!(height = reached, "Halt height reached");
            Ok::<_, HarnessError>(())
        }
        .await;

        // Followers are released whether or not the run reached its height
        let end = Command::end_test(self.next_id());
        let ended = self.send(&end).await;

        if let Err(e) = &run {
            warn!("Execution failed: {}", e);
        }
        run.and(ended)
    }

    pub async fn retro(&mut self) -> Result<RetroReport> {
        let observations = match self.observer.take() {
            Some(observer) => observer.stop().await,
            None => Vec::new(),
        };

        let scanned = match &self.waiter {
            Some(waiter) => scan_chain(waiter, &self.ctx.name).await,
            None => Err(HarnessError::Phase("leader retro before plan completed".into())),
        };

        if let Err(e) = self.ctx.node.stop().await {
            warn!(participant = %self.ctx.name, "Failed to stop local node: {}", e);
        }

        Ok(scanned?.with_observations(&observations))
    }

    /// Best-effort teardown after a failed plan
    pub async fn abort(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.stop().await;
        }
        if let Err(e) = self.ctx.node.stop().await {
            warn!(participant = %self.ctx.name, "Failed to stop local node: {}", e);
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_command_id;
        self.next_command_id += 1;
        id
    }

    async fn send(&self, command: &Command) -> Result<()> {
        ledgerlab_protocol::publish(&*self.ctx.rendezvous, COMMANDS, command).await?;
        info!(id = command.id, end = command.is_end_test(), "Command published");
        Ok(())
    }
}

impl std::fmt::Debug for Leader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leader")
            .field("ctx", &self.ctx)
            .field("configurators", &self.configurators.len())
            .field("next_command_id", &self.next_command_id)
            .finish_non_exhaustive()
    }
}
