//! Ledgerlab Core - Shared types, collaborator traits and errors
//!
//! This crate defines the vocabulary every other ledgerlab crate speaks:
//! the data exchanged during bootstrap, the commands issued during a run,
//! the interfaces to ledger nodes, and the error taxonomy.
//!
//! # Modules
//!
//! - [`types`] - Keys, hashes, blocks and transaction results
//! - [`packet`] - Per-follower bootstrap contribution
//! - [`genesis`] - Genesis document and a deterministic builder
//! - [`command`] - Leader-issued lifecycle commands
//! - [`config`] - Run parameters and per-node configuration
//! - [`ledger`] - Node, query, broadcast and subscription interfaces
//! - [`rendezvous`] - Coordination channel interface
//! - [`error`] - Error types

// Data modules
pub mod types;
pub mod packet;
pub mod genesis;
pub mod command;

// Infrastructure modules
pub mod config;
pub mod ledger;
pub mod rendezvous;
pub mod error;

// Re-exports for convenience
pub use error::{
    BootstrapError, HarnessError, Observation, Result, TimeoutError, WaitCondition, WaitLimit,
};

pub use types::{
    AccountId, BlockCommitted, BlockInfo, BroadcastMode, BroadcastResponse, ChainStatus, Height,
    PublicKey, SignedTx, TxHash, TxResult, CODE_OK, PUBLIC_KEY_SIZE,
};

pub use packet::PeerPacket;
pub use genesis::{DeterministicGenesisBuilder, GenesisAccount, GenesisDocument};
pub use command::{Command, CommandKind, LoadParams};

pub use config::{NodeConfig, NodeRole, RunParams, TestgroundConfig, WaitConfig};

pub use ledger::{
    BlockSubscriber, ConsensusNode, GenesisBuilder, LedgerHandle, LedgerQuery, PacketSource,
    TxBroadcaster, TxFactory, NEW_BLOCK_QUERY,
};

pub use rendezvous::{Rendezvous, Subscription};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
