//! Collect and Genesis steps of the leader's bootstrap
//!
//! Collection is tolerant of the channel's at-least-once delivery: a
//! byte-identical redelivery of a packet already accepted is ignored, while
//! a different second packet from the same participant is fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ledgerlab_core::{BootstrapError, GenesisBuilder, GenesisDocument, HarnessError, PeerPacket, Result};
use ledgerlab_protocol::TypedSubscription;

use crate::wait::{deadline_after, until};

/// What happened to an offered packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Redelivered,
}

/// Tracks which expected followers have delivered their packet
#[derive(Debug, Clone)]
pub struct PacketCollector {
    expected: BTreeSet<String>,
    received: BTreeMap<String, PeerPacket>,
}

impl PacketCollector {
    pub fn new(expected: impl IntoIterator<Item = String>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            received: BTreeMap::new(),
        }
    }

    pub fn offer(&mut self, packet: PeerPacket) -> std::result::Result<Offer, BootstrapError> {
        if !self.expected.contains(&packet.participant) {
            return Err(BootstrapError::UnexpectedParticipant {
                participant: packet.participant,
            });
        }
        packet.validate()?;

        match self.received.get(&packet.participant) {
            Some(existing) if *existing == packet => Ok(Offer::Redelivered),
            Some(_) => Err(BootstrapError::DuplicatePacket {
                participant: packet.participant,
            }),
            None => {
                self.received.insert(packet.participant.clone(), packet);
                Ok(Offer::Accepted)
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() == self.expected.len()
    }

    /// Expected followers with no packet yet, in name order
    pub fn missing(&self) -> Vec<String> {
        self.expected
            .iter()
            .filter(|name| !self.received.contains_key(*name))
            .cloned()
            .collect()
    }

    pub fn missing_error(&self) -> BootstrapError {
        BootstrapError::MissingPackets {
            missing: self.missing(),
            received: self.received.len(),
            expected: self.expected.len(),
        }
    }

    /// Accepted packets ordered by participant name
    pub fn into_packets(self) -> Vec<PeerPacket> {
        self.received.into_values().collect()
    }
}

/// Read packets until every expected follower delivered one
pub async fn collect_packets(
    packets: &mut TypedSubscription<PeerPacket>,
    expected: impl IntoIterator<Item = String>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<PeerPacket>> {
    let mut collector = PacketCollector::new(expected);
    let deadline = deadline_after(timeout);

    while !collector.is_complete() {
        let packet = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HarnessError::Cancelled),
            _ = until(deadline) => return Err(collector.missing_error().into()),
            packet = packets.next() => match packet {
                Some(packet) => packet,
                None => {
                    return Err(HarnessError::Rendezvous(format!(
                        "peer packet stream closed; {}",
                        collector.missing_error()
                    )))
                }
            },
        };

        let participant = packet.participant.clone();
        match collector.offer(packet)? {
            Offer::Accepted => info!(
                participant = %participant,
                missing = collector.missing().len(),
                "Received peer packet"
            ),
            Offer::Redelivered => debug!(participant = %participant, "Ignoring redelivered peer packet"),
        }
    }

    Ok(collector.into_packets())
}

/// Fold packets into a genesis document
///
/// Packets are folded in participant-name order whatever order they are
/// given in, so the same set always yields the same document.
pub fn build_genesis(
    builder: &dyn GenesisBuilder,
    chain_id: &str,
    packets: &[PeerPacket],
) -> std::result::Result<GenesisDocument, BootstrapError> {
    let mut ordered: Vec<&PeerPacket> = packets.iter().collect();
    ordered.sort_by(|a, b| a.participant.cmp(&b.participant));

    let mut txs = Vec::with_capacity(ordered.len());
    let mut accounts = Vec::new();
    let mut pubkeys = Vec::new();
    for packet in ordered {
        txs.push(packet.signed_bootstrap_tx.clone());
        accounts.extend(packet.genesis_accounts.iter().cloned());
        pubkeys.extend(packet.public_keys.iter().cloned());
    }

    builder
        .build_genesis(chain_id, txs, accounts, pubkeys)
        .map_err(|e| BootstrapError::Genesis(e.to_string()))
}
