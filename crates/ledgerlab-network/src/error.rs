//! Rendezvous network error types
//!
//! Everything here surfaces to the harness as `HarnessError::Rendezvous`.
//! A publish with no mesh peers is not an error: the payload is logged
//! locally and goes out again on the next republish.

use ledgerlab_core::HarnessError;
use libp2p::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RendezvousError {
    /// Dialing or upgrading a connection to another participant failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service could not bind one of its `listen_addresses`
    #[error("Failed to listen on {address}: {reason}")]
    ListenFailed { address: String, reason: String },

    /// Gossipsub refused to join a topic or rejected a publish outright,
    /// e.g. a signing failure or a full send queue
    #[error("Gossipsub error: {0}")]
    Gossipsub(String),

    /// Payload exceeds `max_message_size`; genesis documents are the usual culprit
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A listen or bootstrap address did not parse
    #[error("Invalid multiaddr: {0}")]
    InvalidMultiaddr(String),

    /// The handle outlived the service task
    #[error("Rendezvous service stopped: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl<T> From<TransportError<T>> for RendezvousError
where
    T: std::fmt::Debug,
{
    fn from(err: TransportError<T>) -> Self {
        RendezvousError::Transport(format!("{:?}", err))
    }
}

impl From<std::io::Error> for RendezvousError {
    fn from(err: std::io::Error) -> Self {
        RendezvousError::Transport(err.to_string())
    }
}

impl From<RendezvousError> for HarnessError {
    fn from(err: RendezvousError) -> Self {
        HarnessError::Rendezvous(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RendezvousError>;
