//! Ledgerlab Network - Rendezvous channel implementations
//!
//! Two implementations of the harness `Rendezvous` trait:
//!
//! - [`MemoryRendezvous`] - in-process topic logs, for participants that run
//!   as tasks in one process
//! - [`RendezvousService`] - libp2p gossipsub over TCP/Noise/Yamux, for
//!   participants in separate processes or hosts
//!
//! # Example
//!
//! ```rust,no_run
//! use ledgerlab_network::{RendezvousConfig, RendezvousService};
//! use libp2p::identity::Keypair;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keypair = Keypair::generate_ed25519();
//!     let config = RendezvousConfig::local_test(4101);
//!     let (service, handle, _events) = RendezvousService::new(keypair, config)?;
//!
//!     tokio::spawn(async move {
//!         if let Err(e) = service.run().await {
//!             eprintln!("Rendezvous service failed: {}", e);
//!         }
//!     });
//!
//!     handle.publish_raw("commands", b"hello".to_vec()).await?;
//!     let mut sub = handle.subscribe_raw("commands").await?;
//!     while let Some(payload) = sub.next().await {
//!         println!("{} bytes", payload.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod behaviour;
pub mod config;
pub mod error;
pub mod event;
pub mod log;
pub mod memory;
pub mod service;
pub mod transport;

// Re-exports
pub use behaviour::{RendezvousBehaviour, RendezvousBehaviourEvent};
pub use config::RendezvousConfig;
pub use error::{RendezvousError, Result};
pub use event::RendezvousEvent;
pub use log::TopicLogs;
pub use memory::MemoryRendezvous;
pub use service::{RendezvousCommand, RendezvousHandle, RendezvousService};
pub use transport::{create_transport, extract_peer_id, parse_multiaddr};

pub use libp2p::identity::Keypair;
pub use libp2p::Multiaddr;
