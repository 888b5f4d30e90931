//! Events emitted by the rendezvous service

use chrono::{DateTime, Utc};
use libp2p::{Multiaddr, PeerId};

/// Events emitted by the rendezvous service
#[derive(Debug, Clone)]
pub enum RendezvousEvent {
    /// Service started
    Started {
        peer_id: PeerId,
        listen_addresses: Vec<Multiaddr>,
    },

    /// Service stopped
    Stopped,

    /// Started listening on an address
    ListeningOn { address: Multiaddr },

    /// First connection to a peer established
    PeerConnected { peer_id: PeerId, num_connections: usize },

    /// Last connection to a peer closed
    PeerDisconnected { peer_id: PeerId, num_connections: usize },

    /// A remote peer joined a topic
    PeerSubscribed { peer_id: PeerId, topic: String },

    /// A payload not seen before was appended to a topic log
    MessageAppended {
        topic: String,
        source: Option<PeerId>,
        bytes: usize,
        timestamp: DateTime<Utc>,
    },

    /// Own messages were sent again
    Republished { topic: String, count: usize },
}

impl RendezvousEvent {
    /// Check if this is a peer connection event
    pub fn is_peer_event(&self) -> bool {
        matches!(
            self,
            RendezvousEvent::PeerConnected { .. } | RendezvousEvent::PeerDisconnected { .. }
        )
    }

    /// Get the peer ID associated with this event, if any
    pub fn peer_id(&self) -> Option<&PeerId> {
        match self {
            RendezvousEvent::PeerConnected { peer_id, .. } => Some(peer_id),
            RendezvousEvent::PeerDisconnected { peer_id, .. } => Some(peer_id),
            RendezvousEvent::PeerSubscribed { peer_id, .. } => Some(peer_id),
            RendezvousEvent::MessageAppended { source, .. } => source.as_ref(),
            _ => None,
        }
    }
}
