//! Transport stack: TCP with Noise encryption, Yamux multiplexing and DNS

use libp2p::{core::upgrade, identity::Keypair, noise, yamux, PeerId, Transport};
use std::time::Duration;

use crate::error::{RendezvousError, Result};

/// Create the boxed transport used by the rendezvous swarm
pub fn create_transport(
    keypair: &Keypair,
    connection_timeout: Duration,
) -> Result<libp2p::core::transport::Boxed<(PeerId, libp2p::core::muxing::StreamMuxerBox)>> {
    let tcp = libp2p::tcp::tokio::Transport::new(libp2p::tcp::Config::default().nodelay(true));

    let noise_config = noise::Config::new(keypair)
        .map_err(|e| RendezvousError::Config(format!("Noise config error: {:?}", e)))?;

    let transport = tcp
        .upgrade(upgrade::Version::V1)
        .authenticate(noise_config)
        .multiplex(yamux::Config::default())
        .timeout(connection_timeout)
        .map(|(peer_id, muxer), _| (peer_id, libp2p::core::muxing::StreamMuxerBox::new(muxer)));

    let dns_transport = libp2p::dns::tokio::Transport::system(transport)
        .map_err(|e| RendezvousError::Config(format!("DNS config error: {:?}", e)))?;

    Ok(dns_transport.boxed())
}

/// Parse a multiaddr string
pub fn parse_multiaddr(addr: &str) -> Result<libp2p::Multiaddr> {
    addr.parse()
        .map_err(|e| RendezvousError::InvalidMultiaddr(format!("{}: {}", addr, e)))
}

/// Extract peer ID from a multiaddr if present
pub fn extract_peer_id(addr: &libp2p::Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| {
        if let libp2p::multiaddr::Protocol::P2p(peer_id) = p {
            Some(peer_id)
        } else {
            None
        }
    })
}
