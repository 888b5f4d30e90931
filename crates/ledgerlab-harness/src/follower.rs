//! Follower role: contribute a packet, join the network, run load on command

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use ledgerlab_core::{
    BootstrapError, Command, CommandKind, HarnessError, LedgerHandle, PacketSource, PeerPacket,
    Result, TestgroundConfig, TimeoutError, TxFactory, WaitCondition, WaitLimit,
};
use ledgerlab_protocol::{TypedSubscription, COMMANDS, PEER_PACKETS, TESTGROUND_CONFIG};

use crate::context::ParticipantContext;
use crate::load::{LoadGenerator, LoadStats};
use crate::wait::{deadline_after, until};

pub struct Follower {
    ctx: ParticipantContext,
    packets: Arc<dyn PacketSource>,
    txs: Arc<dyn TxFactory>,
    packet: Option<PeerPacket>,
    testground: Option<TestgroundConfig>,
    ledger: Option<LedgerHandle>,
    commands: Option<TypedSubscription<Command>>,
    load: Option<LoadGenerator>,
    load_stats: Option<LoadStats>,
    handled: HashSet<u64>,
}

impl Follower {
    pub fn new(
        ctx: ParticipantContext,
        packets: Arc<dyn PacketSource>,
        txs: Arc<dyn TxFactory>,
    ) -> Self {
        Self {
            ctx,
            packets,
            txs,
            packet: None,
            testground: None,
            ledger: None,
            commands: None,
            load: None,
            load_stats: None,
            handled: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.ctx.name
    }

    pub fn context(&self) -> &ParticipantContext {
        &self.ctx
    }

    /// The packet this follower contributed
    pub fn packet(&self) -> Option<&PeerPacket> {
        self.packet.as_ref()
    }

    pub fn testground_config(&self) -> Option<&TestgroundConfig> {
        self.testground.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.load.as_ref().is_some_and(LoadGenerator::is_running)
    }

    /// Totals of the load run, once it has been stopped
    pub fn load_stats(&self) -> Option<LoadStats> {
        self.load_stats
    }

    pub async fn plan(&mut self) -> Result<()> {
        let name = self.ctx.name.clone();
        let params = &self.ctx.params;

        let packet = self.packets.peer_packet(&name, &params.chain_id).await?;
        if packet.participant != name {
            return Err(BootstrapError::InvalidPacket {
                participant: name,
                reason: format!("packet names participant {}", packet.participant),
            }
            .into());
        }
        packet.validate()?;

        let mut configs = ledgerlab_protocol::subscribe(&*self.ctx.rendezvous, TESTGROUND_CONFIG).await?;
        ledgerlab_protocol::publish(&*self.ctx.rendezvous, PEER_PACKETS, &packet)
            .await
            .map_err(|e| match e {
                HarnessError::Cancelled => e,
                e => BootstrapError::Publish {
                    what: "peer packet".into(),
                    reason: e.to_string(),
                }
                .into(),
            })?;
        info!(participant = %name, "Peer packet published");
        self.packet = Some(packet);

        let config = self.await_config(&mut configs).await?;
        let node_config = config.node(&name)?.clone();
        let genesis = config.genesis.clone();
        self.testground = Some(config);

        // Subscribed before the node starts; the channel replays from the beginning either way
        self.commands = Some(ledgerlab_protocol::subscribe(&*self.ctx.rendezvous, COMMANDS).await?);

        let ledger = self.ctx.launch_node(&genesis, &node_config).await?;
        let waiter = self.ctx.waiter(&ledger);
        self.ledger = Some(ledger);
        self.ctx.await_start(&waiter).await?;
        Ok(())
    }

    async fn await_config(
        &self,
        configs: &mut TypedSubscription<TestgroundConfig>,
    ) -> Result<TestgroundConfig> {
        let timeout = self.ctx.params.setup_timeout;
        let deadline = deadline_after(timeout);

        loop {
            let config = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => return Err(HarnessError::Cancelled),
                _ = until(deadline) => return Err(BootstrapError::ConfigNotReceived(timeout).into()),
                config = configs.next() => config.ok_or_else(|| {
                    HarnessError::Rendezvous("testground config stream closed".into())
                })?,
            };

            if config.chain_id != self.ctx.params.chain_id {
                warn!(
                    chain_id = %config.chain_id,
                    expected = %self.ctx.params.chain_id,
                    "Ignoring config for another chain"
                );
                continue;
            }
            info!(participant = %self.ctx.name, nodes = config.nodes.len(), "Testground config received");
            return Ok(config);
        }
    }

    /// Follow the leader's commands until end of test
    pub async fn execute(&mut self) -> Result<()> {
        let ledger = self
            .ledger
            .clone()
            .ok_or_else(|| HarnessError::Phase("follower executed before plan completed".into()))?;
        let mut commands = self
            .commands
            .take()
            .ok_or_else(|| HarnessError::Phase("follower has no command subscription".into()))?;

        let params = &self.ctx.params;
        let bound = params
            .execution_timeout
            .saturating_add(params.warmup)
            .saturating_add(params.setup_timeout);
        let deadline = deadline_after(bound);

        loop {
            let command = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => return Err(HarnessError::Cancelled),
                _ = until(deadline) => {
                    return Err(TimeoutError {
                        condition: WaitCondition::EndOfTest,
                        limit: WaitLimit::Elapsed(bound),
                        last_observed: None,
                    }
                    .into())
                }
                command = commands.next() => command.ok_or_else(|| {
                    HarnessError::Rendezvous("command stream closed before end of test".into())
                })?,
            };

            if !self.handled.insert(command.id) {
                debug!(id = command.id, "Ignoring repeated command");
                continue;
            }

            match command.kind {
                CommandKind::StartLoad(load) => {
                    if self.load.is_some() {
                        warn!(id = command.id, "Load already started, ignoring");
                        continue;
                    }
                    info!(id = command.id, load = %load.name, "Starting load");
                    self.load = Some(LoadGenerator::spawn(
                        load,
                        ledger.clone(),
                        self.txs.clone(),
                        &self.ctx.cancel,
                    ));
                }
                CommandKind::EndTest => {
                    info!(id = command.id, participant = %self.ctx.name, "End of test");
                    self.stop_load().await;
                    return Ok(());
                }
            }
        }
    }

    pub async fn retro(&mut self) -> Result<()> {
        self.stop_load().await;
        self.ctx.node.stop().await?;
        info!(participant = %self.ctx.name, "Local node stopped");
        Ok(())
    }

    /// Best-effort teardown after a failed plan
    pub async fn abort(&mut self) {
        self.stop_load().await;
        if let Err(e) = self.ctx.node.stop().await {
            warn!(participant = %self.ctx.name, "Failed to stop local node: {}", e);
        }
    }

    async fn stop_load(&mut self) {
        if let Some(load) = self.load.take() {
            self.load_stats = Some(load.stop().await);
        }
    }
}

impl std::fmt::Debug for Follower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Follower")
            .field("ctx", &self.ctx)
            .field("handled", &self.handled.len())
            .finish_non_exhaustive()
    }
}
