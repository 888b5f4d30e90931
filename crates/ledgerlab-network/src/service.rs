//! Rendezvous service - gossipsub-backed coordination channel
//!
//! The RendezvousService owns the libp2p swarm and the local topic logs.
//! Callers interact with it through a cloneable RendezvousHandle, which
//! implements the harness `Rendezvous` trait.
//!
//! Gossipsub alone does not give the append-only replay semantics the
//! harness needs: a peer that joins late never sees messages published
//! before it connected. The service closes that gap by keeping its own
//! publications in an outbox and sending them again on every
//! `republish_interval` tick and whenever a remote peer joins the topic.
//! Receivers drop repeats by content digest, so each distinct payload lands
//! in a topic log once.
//!
//! The outbox holds at most `max_outbox` payloads. Past that the oldest are
//! dropped and no longer reach peers that join afterwards; they stay in the
//! local topic log.

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{gossipsub, identify, swarm::SwarmEvent, Multiaddr, PeerId, Swarm};
use std::collections::{HashSet, VecDeque};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use ledgerlab_core::rendezvous::{Rendezvous, Subscription};
use ledgerlab_core::HarnessError;

use crate::behaviour::{RendezvousBehaviour, RendezvousBehaviourEvent};
use crate::config::RendezvousConfig;
use crate::error::{RendezvousError, Result};
use crate::event::RendezvousEvent;
use crate::log::TopicLogs;
use crate::transport::{self, parse_multiaddr};

/// Commands sent to the rendezvous service
#[derive(Debug)]
pub enum RendezvousCommand {
    /// Dial a peer
    Dial { address: Multiaddr },
    /// Join a topic and replay its log
    Subscribe {
        topic: String,
        response: oneshot::Sender<Result<Subscription>>,
    },
    /// Publish a payload
    Publish {
        topic: String,
        data: Vec<u8>,
        response: oneshot::Sender<Result<()>>,
    },
    /// Get connected peers
    GetPeers { response: oneshot::Sender<Vec<PeerId>> },
    /// Shutdown
    Shutdown,
}

/// Handle for interacting with the rendezvous service
#[derive(Clone, Debug)]
pub struct RendezvousHandle {
    command_tx: mpsc::Sender<RendezvousCommand>,
    local_peer_id: PeerId,
}

impl RendezvousHandle {
    /// Get the local peer ID
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Dial a peer by multiaddr
    pub async fn dial(&self, address: Multiaddr) -> Result<()> {
        self.command_tx
            .send(RendezvousCommand::Dial { address })
            .await
            .map_err(|_| RendezvousError::Channel("Failed to send dial command".into()))
    }

    /// Publish a payload on a topic
    pub async fn publish_raw(&self, topic: impl Into<String>, data: Vec<u8>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(RendezvousCommand::Publish {
                topic: topic.into(),
                data,
                response: tx,
            })
            .await
            .map_err(|_| RendezvousError::Channel("Failed to send publish command".into()))?;

        rx.await
            .map_err(|_| RendezvousError::Channel("Failed to receive publish result".into()))?
    }

    /// Subscribe to a topic from its beginning
    pub async fn subscribe_raw(&self, topic: impl Into<String>) -> Result<Subscription> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(RendezvousCommand::Subscribe {
                topic: topic.into(),
                response: tx,
            })
            .await
            .map_err(|_| RendezvousError::Channel("Failed to send subscribe command".into()))?;

        rx.await
            .map_err(|_| RendezvousError::Channel("Failed to receive subscription".into()))?
    }

    /// Get list of connected peers
    pub async fn get_peers(&self) -> Result<Vec<PeerId>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(RendezvousCommand::GetPeers { response: tx })
            .await
            .map_err(|_| RendezvousError::Channel("Failed to send get_peers command".into()))?;

        rx.await
            .map_err(|_| RendezvousError::Channel("Failed to receive peers".into()))
    }

    /// Shutdown the rendezvous service
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(RendezvousCommand::Shutdown)
            .await
            .map_err(|_| RendezvousError::Channel("Failed to send shutdown command".into()))
    }
}

#[async_trait]
impl Rendezvous for RendezvousHandle {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ledgerlab_core::Result<()> {
        self.publish_raw(topic, payload)
            .await
            .map_err(HarnessError::from)
    }

    async fn subscribe(&self, topic: &str) -> ledgerlab_core::Result<Subscription> {
        self.subscribe_raw(topic).await.map_err(HarnessError::from)
    }
}

/// The rendezvous service owns the swarm and the topic logs
pub struct RendezvousService {
    swarm: Swarm<RendezvousBehaviour>,
    config: RendezvousConfig,
    /// Everything seen on each joined topic, own publications included
    logs: TopicLogs,
    /// Own publications, republished for late joiners
    outbox: Outbox,
    joined: HashSet<String>,
    connected: HashSet<PeerId>,
    event_tx: broadcast::Sender<RendezvousEvent>,
    command_rx: mpsc::Receiver<RendezvousCommand>,
}

impl RendezvousService {
    /// Create a new rendezvous service
    pub fn new(
        keypair: libp2p::identity::Keypair,
        config: RendezvousConfig,
    ) -> Result<(Self, RendezvousHandle, broadcast::Receiver<RendezvousEvent>)> {
        let local_peer_id = keypair.public().to_peer_id();
        info!("Local peer ID: {}", local_peer_id);

        let transport = transport::create_transport(&keypair, config.connection_timeout)?;
        let behaviour = RendezvousBehaviour::new(&keypair, &config)?;

        let swarm = Swarm::new(
            transport,
            behaviour,
            local_peer_id,
            libp2p::swarm::Config::with_tokio_executor()
                .with_idle_connection_timeout(config.idle_timeout()),
        );

        let (event_tx, event_rx) = broadcast::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(256);

        let handle = RendezvousHandle {
            command_tx,
            local_peer_id,
        };

        let outbox = Outbox::new(config.max_outbox);
        let service = Self {
            swarm,
            config,
            logs: TopicLogs::deduplicating(),
            outbox,
            joined: HashSet::new(),
            connected: HashSet::new(),
            event_tx,
            command_rx,
        };

        Ok((service, handle, event_rx))
    }

    /// Run the service until shutdown
    pub async fn run(mut self) -> Result<()> {
        info!("Starting rendezvous service");

        for addr_str in &self.config.listen_addresses.clone() {
            let addr = parse_multiaddr(addr_str)?;
            self.swarm
                .listen_on(addr.clone())
                .map_err(|e| RendezvousError::ListenFailed {
                    address: addr_str.clone(),
                    reason: e.to_string(),
                })?;
            info!("Listening on {}", addr);
        }

        for topic in self.config.topics.clone() {
            if let Err(e) = self.join(&topic) {
                warn!("Failed to join {}: {}", topic, e);
            }
        }

        for addr_str in &self.config.bootstrap_peers.clone() {
            let addr = match parse_multiaddr(addr_str) {
                Ok(a) => a,
                Err(e) => {
                    warn!("Invalid bootstrap address {}: {}", addr_str, e);
                    continue;
                }
            };

            if let Err(e) = self.swarm.dial(addr.clone()) {
                warn!("Failed to dial bootstrap peer {}: {:?}", addr, e);
            } else {
                info!("Dialing bootstrap peer {}", addr);
            }
        }

        let _ = self.event_tx.send(RendezvousEvent::Started {
            peer_id: *self.swarm.local_peer_id(),
            listen_addresses: self.swarm.listeners().cloned().collect(),
        });

        let period = self.config.republish_interval;
        let mut republish = interval_at(Instant::now() + period, period);
        republish.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd) {
                                break;
                            }
                        }
                        // Every handle dropped
                        None => break,
                    }
                }

                _ = republish.tick() => {
                    self.republish(None);
                }
            }
        }

        self.logs.close();
        let _ = self.event_tx.send(RendezvousEvent::Stopped);
        info!("Rendezvous service stopped");

        Ok(())
    }

    /// Join a gossipsub topic once
    fn join(&mut self, topic: &str) -> Result<()> {
        if self.joined.contains(topic) {
            return Ok(());
        }
        if self.swarm.behaviour_mut().subscribe(topic)? {
            info!("Joined topic {} (awaiting mesh formation)", topic);
        }
        self.joined.insert(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, data: Vec<u8>) -> Result<()> {
        if data.len() > self.config.max_message_size {
            return Err(RendezvousError::MessageTooLarge {
                size: data.len(),
                max: self.config.max_message_size,
            });
        }

        self.join(topic)?;

        let mesh_peers = self.swarm.behaviour().mesh_peers(topic).len();
        match self.swarm.behaviour_mut().publish(topic, data.clone()) {
            Ok(msg_id) => {
                info!(
                    "Published message {} to '{}' | {} bytes | Mesh peers: {}",
                    msg_id,
                    topic,
                    data.len(),
                    mesh_peers
                );
            }
            Err(gossipsub::PublishError::InsufficientPeers) => {
                debug!(
                    "No peers on '{}' yet, queued for republish behind {} message(s)",
                    topic,
                    self.outbox.len()
                );
            }
            Err(gossipsub::PublishError::Duplicate) => {
                debug!("Duplicate publish to '{}' suppressed by gossipsub", topic);
            }
            Err(e) => {
                return Err(RendezvousError::Gossipsub(format!(
                    "Failed to publish to {}: {:?}",
                    topic, e
                )));
            }
        }

        if self.logs.append(topic, data.clone()) {
            if let Some(dropped) = self.outbox.push(topic, data) {
                warn!(
                    "Outbox full ({}), oldest message on '{}' will not be republished",
                    self.config.max_outbox, dropped
                );
            }
        }
        Ok(())
    }

    /// Send own messages again, optionally only those of one topic
    fn republish(&mut self, only: Option<&str>) {
        let mut sent: Vec<(String, usize)> = Vec::new();

        for (topic, data) in self.outbox.iter(only) {
            match self.swarm.behaviour_mut().publish(topic, data.clone()) {
                Ok(_) => match sent.iter_mut().find(|(t, _)| *t == *topic) {
                    Some((_, count)) => *count += 1,
                    None => sent.push((topic.clone(), 1)),
                },
                Err(e) => debug!("Republish to '{}' skipped: {:?}", topic, e),
            }
        }

        for (topic, count) in sent {
            debug!("Republished {} message(s) to '{}'", count, topic);
            let _ = self
                .event_tx
                .send(RendezvousEvent::Republished { topic, count });
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<RendezvousBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(behaviour_event) => {
                self.handle_behaviour_event(behaviour_event);
            }

            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                ..
            } => {
                debug!("Connection established with {}", peer_id);
                if num_established.get() == 1 {
                    self.connected.insert(peer_id);
                    let _ = self.event_tx.send(RendezvousEvent::PeerConnected {
                        peer_id,
                        num_connections: self.connected.len(),
                    });
                }
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                debug!("Connection closed with {}: {:?}", peer_id, cause);
                if num_established == 0 {
                    self.connected.remove(&peer_id);
                    let _ = self.event_tx.send(RendezvousEvent::PeerDisconnected {
                        peer_id,
                        num_connections: self.connected.len(),
                    });
                }
            }

            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}", address);
                let _ = self.event_tx.send(RendezvousEvent::ListeningOn { address });
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!("Dial error for {:?}: {}", peer_id, error);
            }

            _ => {}
        }
    }

    fn handle_behaviour_event(&mut self, event: RendezvousBehaviourEvent) {
        match event {
            RendezvousBehaviourEvent::Gossipsub(gossipsub::Event::Message { message, .. }) => {
                let topic = message.topic.to_string();
                if !self.joined.contains(&topic) {
                    return;
                }

                let bytes = message.data.len();
                if self.logs.append(&topic, message.data) {
                    debug!("Appended {} bytes to '{}' from {:?}", bytes, topic, message.source);
                    let _ = self.event_tx.send(RendezvousEvent::MessageAppended {
                        topic,
                        source: message.source,
                        bytes,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }

            RendezvousBehaviourEvent::Gossipsub(gossipsub::Event::Subscribed { peer_id, topic }) => {
                let topic = topic.to_string();
                info!(
                    "Peer {} joined '{}' | Total subscribed: {}",
                    peer_id,
                    topic,
                    self.swarm.behaviour().all_peers_on_topic(&topic).len()
                );

                // Catch the newcomer up without waiting for the next tick
                self.republish(Some(&topic));

                let _ = self
                    .event_tx
                    .send(RendezvousEvent::PeerSubscribed { peer_id, topic });
            }

            RendezvousBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
                debug!("Identified peer {}: {}", peer_id, info.agent_version);
            }

            _ => {}
        }
    }

    /// Handle a command, returns false if should shutdown
    fn handle_command(&mut self, cmd: RendezvousCommand) -> bool {
        match cmd {
            RendezvousCommand::Dial { address } => {
                if let Err(e) = self.swarm.dial(address.clone()) {
                    warn!("Failed to dial {}: {:?}", address, e);
                } else {
                    debug!("Dialing {}", address);
                }
            }

            RendezvousCommand::Subscribe { topic, response } => {
                let result = self.join(&topic).map(|()| self.logs.subscribe(&topic));
                let _ = response.send(result);
            }

            RendezvousCommand::Publish {
                topic,
                data,
                response,
            } => {
                let result = self.publish(&topic, data);
                if let Err(e) = &result {
                    warn!("Failed to publish to '{}': {}", topic, e);
                }
                let _ = response.send(result);
            }

            RendezvousCommand::GetPeers { response } => {
                let _ = response.send(self.connected.iter().cloned().collect());
            }

            RendezvousCommand::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }

        true
    }
}

/// Bounded FIFO of own publications
#[derive(Debug)]
struct Outbox {
    entries: VecDeque<(String, Vec<u8>)>,
    capacity: usize,
}

impl Outbox {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Keep a payload, returning the topic of the entry evicted to make room
    fn push(&mut self, topic: &str, data: Vec<u8>) -> Option<String> {
        if self.capacity == 0 {
            return Some(topic.to_string());
        }
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front().map(|(t, _)| t)
        } else {
            None
        };
        self.entries.push_back((topic.to_string(), data));
        evicted
    }

    /// Entries in publish order, optionally only those of one topic
    fn iter<'a>(&'a self, only: Option<&'a str>) -> impl Iterator<Item = &'a (String, Vec<u8>)> + 'a {
        self.entries
            .iter()
            .filter(move |(t, _)| only.map_or(true, |o| t.as_str() == o))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_evicts_oldest_past_capacity() {
        let mut outbox = Outbox::new(2);
        assert_eq!(outbox.push("peer-packets", vec![1]), None);
        assert_eq!(outbox.push("commands", vec![2]), None);
        assert_eq!(outbox.push("commands", vec![3]), Some("peer-packets".to_string()));

        assert_eq!(outbox.len(), 2);
        let kept: Vec<_> = outbox.iter(None).map(|(_, d)| d[0]).collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn test_outbox_filters_by_topic() {
        let mut outbox = Outbox::new(8);
        outbox.push("commands", vec![1]);
        outbox.push("testground-config", vec![2]);
        outbox.push("commands", vec![3]);

        let commands: Vec<_> = outbox.iter(Some("commands")).map(|(_, d)| d[0]).collect();
        assert_eq!(commands, vec![1, 3]);
        assert_eq!(outbox.iter(None).count(), 3);
    }

    #[test]
    fn test_zero_capacity_outbox_keeps_nothing() {
        let mut outbox = Outbox::new(0);
        assert_eq!(outbox.push("commands", vec![1]), Some("commands".to_string()));
        assert_eq!(outbox.len(), 0);
    }
}
