//! TestCluster - A leader and N followers over one in-memory rendezvous
//!
//! Every participant gets its own `SimulatedNode`, all backed by one shared
//! `SimulatedChain`. The leader's node produces blocks once it is started,
//! so the chain sits at height 0 until the leader reaches Local Start.
//! Roles run as separate tokio tasks and coordinate only through the
//! rendezvous channel, as separate processes would.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ledgerlab_core::{DeterministicGenesisBuilder, Result, RunParams, WaitConfig};
use ledgerlab_harness::test_utils::{RandomTxFactory, SimulatedChain, SimulatedKeyring, SimulatedNode};
use ledgerlab_harness::{run, Configurator, Follower, Leader, ParticipantContext, Role, RunOutcome};
use ledgerlab_network::MemoryRendezvous;

/// Block time of the shared chain
pub const BLOCK_TIME: Duration = Duration::from_secs(1);

pub struct TestCluster {
    pub params: RunParams,
    pub wait: WaitConfig,
    pub rendezvous: MemoryRendezvous,
    pub chain: SimulatedChain,
    pub leader_node: SimulatedNode,
    pub follower_nodes: Vec<SimulatedNode>,
    pub cancel: CancellationToken,
}

/// Results of every participant's run
pub struct ClusterOutcome {
    pub leader: Result<RunOutcome>,
    pub followers: Vec<Result<RunOutcome>>,
}

impl ClusterOutcome {
    pub fn all_succeeded(&self) -> bool {
        let ok = |r: &Result<RunOutcome>| r.as_ref().is_ok_and(RunOutcome::is_success);
        ok(&self.leader) && self.followers.iter().all(ok)
    }
}

impl TestCluster {
    /// A cluster with `followers` followers and default local-test parameters
    pub fn new(followers: usize) -> Self {
        Self::with_params(RunParams::local_test(followers))
    }

    pub fn with_params(params: RunParams) -> Self {
        let chain = SimulatedChain::new(BLOCK_TIME);
        let leader_node = SimulatedNode::producer(params.leader.clone(), chain.clone());
        let follower_nodes = params
            .followers
            .iter()
            .map(|name| SimulatedNode::new(name.clone(), chain.clone()))
            .collect();

        Self {
            params,
            wait: WaitConfig::default(),
            rendezvous: MemoryRendezvous::new(),
            chain,
            leader_node,
            follower_nodes,
            cancel: CancellationToken::new(),
        }
    }

    fn context(&self, name: &str, node: &SimulatedNode) -> ParticipantContext {
        ParticipantContext::new(
            name,
            self.params.clone(),
            Arc::new(self.rendezvous.clone()),
            Arc::new(node.clone()),
        )
        .with_wait_config(self.wait)
        .with_cancel(self.cancel.child_token())
    }

    pub fn leader(&self) -> Leader {
        Leader::new(
            self.context(&self.params.leader, &self.leader_node),
            Arc::new(DeterministicGenesisBuilder::default()),
        )
    }

    pub fn follower(&self, index: usize) -> Follower {
        let node = &self.follower_nodes[index];
        Follower::new(
            self.context(node.name(), node),
            Arc::new(SimulatedKeyring::new()),
            Arc::new(RandomTxFactory),
        )
    }

    pub fn followers(&self) -> Vec<Follower> {
        (0..self.follower_nodes.len()).map(|i| self.follower(i)).collect()
    }

    /// Spawn a role's full run as its own task
    pub fn spawn(role: Role) -> JoinHandle<Result<RunOutcome>> {
        tokio::spawn(run(role))
    }

    /// Run the leader and every follower to completion
    pub async fn run(&self, configurators: Vec<Box<dyn Configurator>>) -> ClusterOutcome {
        let leader = self.leader().with_configurators(configurators);
        self.run_roles(leader, self.followers()).await
    }

    pub async fn run_roles(&self, leader: Leader, followers: Vec<Follower>) -> ClusterOutcome {
        let followers: Vec<_> = followers
            .into_iter()
            .map(|f| Self::spawn(Role::Follower(f)))
            .collect();
        let leader = Self::spawn(Role::Leader(leader));

        let leader = leader.await.expect("leader task panicked");
        let mut results = Vec::with_capacity(followers.len());
        for follower in followers {
            results.push(follower.await.expect("follower task panicked"));
        }

        ClusterOutcome {
            leader,
            followers: results,
        }
    }

    /// Every node, leader first
    pub fn nodes(&self) -> impl Iterator<Item = &SimulatedNode> {
        std::iter::once(&self.leader_node).chain(self.follower_nodes.iter())
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
