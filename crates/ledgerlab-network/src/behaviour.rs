//! Network behaviour for the rendezvous swarm
//!
//! Gossipsub carries the topic payloads; identify lets peers learn each
//! other's listen addresses.

use libp2p::{
    gossipsub::{self, IdentTopic, MessageAuthenticity, MessageId, ValidationMode},
    identify,
    identity::Keypair,
    swarm::NetworkBehaviour,
    PeerId,
};
use std::time::Duration;

use crate::config::RendezvousConfig;
use crate::error::RendezvousError;

/// Room for the signed gossipsub envelope around a payload
const ENVELOPE_OVERHEAD: usize = 4 * 1024;

/// Identify protocol string
pub const PROTOCOL_VERSION: &str = "/ledgerlab/rendezvous/1.0.0";

/// Combined behaviour for the rendezvous swarm
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "RendezvousBehaviourEvent")]
pub struct RendezvousBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub identify: identify::Behaviour,
}

/// Events emitted by the rendezvous behaviour
#[derive(Debug)]
pub enum RendezvousBehaviourEvent {
    Gossipsub(gossipsub::Event),
    Identify(identify::Event),
}

impl From<gossipsub::Event> for RendezvousBehaviourEvent {
    fn from(event: gossipsub::Event) -> Self {
        RendezvousBehaviourEvent::Gossipsub(event)
    }
}

impl From<identify::Event> for RendezvousBehaviourEvent {
    fn from(event: identify::Event) -> Self {
        RendezvousBehaviourEvent::Identify(event)
    }
}

impl RendezvousBehaviour {
    pub fn new(keypair: &Keypair, config: &RendezvousConfig) -> crate::error::Result<Self> {
        Ok(Self {
            gossipsub: create_gossipsub(keypair, config)?,
            identify: create_identify(keypair),
        })
    }

    /// Join a topic. Returns false if already joined.
    pub fn subscribe(&mut self, topic: &str) -> crate::error::Result<bool> {
        let topic = IdentTopic::new(topic);
        self.gossipsub
            .subscribe(&topic)
            .map_err(|e| RendezvousError::Gossipsub(format!("Failed to subscribe: {:?}", e)))
    }

    /// Publish to a topic
    pub fn publish(
        &mut self,
        topic: &str,
        data: Vec<u8>,
    ) -> std::result::Result<MessageId, gossipsub::PublishError> {
        self.gossipsub.publish(IdentTopic::new(topic), data)
    }

    /// Peers in the gossipsub mesh for a topic
    pub fn mesh_peers(&self, topic: &str) -> Vec<PeerId> {
        let topic_hash = IdentTopic::new(topic).hash();
        self.gossipsub.mesh_peers(&topic_hash).cloned().collect()
    }

    /// All peers subscribed to a topic, mesh or not
    pub fn all_peers_on_topic(&self, topic: &str) -> Vec<PeerId> {
        let topic_hash = IdentTopic::new(topic).hash();
        self.gossipsub
            .all_peers()
            .filter(|(_, topics)| topics.contains(&&topic_hash))
            .map(|(peer_id, _)| *peer_id)
            .collect()
    }
}

/// Create the gossipsub behaviour
///
/// Message ids are the gossipsub default (source and sequence number), so a
/// republished payload is a new gossipsub message. Receivers deduplicate by
/// content in their topic logs instead.
fn create_gossipsub(
    keypair: &Keypair,
    config: &RendezvousConfig,
) -> crate::error::Result<gossipsub::Behaviour> {
    // Constraint: mesh_outbound_min <= mesh_n_low <= mesh_n <= mesh_n_high
    let gossipsub_config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(config.heartbeat_interval)
        .validation_mode(ValidationMode::Strict)
        .max_transmit_size(config.max_message_size + ENVELOPE_OVERHEAD)
        .mesh_outbound_min(0)
        .mesh_n(2)
        .mesh_n_low(1)
        .mesh_n_high(4)
        .gossip_lazy(2)
        .fanout_ttl(Duration::from_secs(60))
        .history_length(5)
        .history_gossip(3)
        .duplicate_cache_time(Duration::from_secs(60))
        .build()
        .map_err(|e| RendezvousError::Config(format!("Gossipsub config error: {}", e)))?;

    gossipsub::Behaviour::new(MessageAuthenticity::Signed(keypair.clone()), gossipsub_config)
        .map_err(|e| RendezvousError::Config(format!("Gossipsub creation error: {}", e)))
}

fn create_identify(keypair: &Keypair) -> identify::Behaviour {
    let config = identify::Config::new(PROTOCOL_VERSION.to_string(), keypair.public())
        .with_agent_version(format!("ledgerlab/{}", env!("CARGO_PKG_VERSION")));

    identify::Behaviour::new(config)
}
