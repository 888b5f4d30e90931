//! Ledgerlab Harness - Multi-node ledger test runs
//!
//! This crate drives an ephemeral cluster of ledger nodes through a test
//! run. One participant is the leader, every other participant a follower;
//! they coordinate only through a [`Rendezvous`](ledgerlab_core::Rendezvous)
//! channel.
//!
//! # Overview
//!
//! - **Bootstrap**: followers publish peer packets, the leader folds them
//!   into genesis, applies configurators and publishes the network config
//! - **Phases**: every role runs Plan, Execute and Retro once, in order
//! - **Waits**: [`ChainWaiter`] blocks on height, timestamp or transaction
//!   inclusion, bounded by a deadline or block budget and a cancellation token
//! - **Observer**: a background task recording every committed block
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ledgerlab_core::{DeterministicGenesisBuilder, RunParams};
//! use ledgerlab_harness::test_utils::{SimulatedChain, SimulatedNode};
//! use ledgerlab_harness::{full_mesh, run, Leader, ParticipantContext, Role};
//! use ledgerlab_network::MemoryRendezvous;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = RunParams::local_test(2);
//!     let chain = SimulatedChain::new(Duration::from_secs(1));
//!     let node = SimulatedNode::producer(params.leader.clone(), chain);
//!
//!     let ctx = ParticipantContext::new(
//!         params.leader.clone(),
//!         params,
//!         Arc::new(MemoryRendezvous::new()),
//!         Arc::new(node),
//!     );
//!     let leader = Leader::new(ctx, Arc::new(DeterministicGenesisBuilder::default()))
//!         .with_configurator(full_mesh());
//!
//!     let outcome = run(Role::Leader(leader)).await?;
//!     println!("{:?}", outcome.retro);
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod configure;
pub mod context;
pub mod follower;
pub mod leader;
pub mod load;
pub mod observer;
pub mod retro;
pub mod role;
pub mod wait;

// Simulated collaborators for tests and local runs
pub mod test_utils;

// Re-exports
pub use bootstrap::{build_genesis, collect_packets, Offer, PacketCollector};
pub use configure::{
    apply_all, configurator, full_mesh, star, with_max_block_bytes, with_mempool_max_txs,
    with_timeout_commit, Configurator,
};
pub use context::ParticipantContext;
pub use follower::Follower;
pub use leader::Leader;
pub use load::{LoadGenerator, LoadStats};
pub use observer::{BlockObservation, BlockObserver, ObservationLog};
pub use retro::{scan_chain, RetroReport};
pub use role::{run, Phase, PhaseDriver, Role, RunOutcome};
pub use wait::ChainWaiter;
