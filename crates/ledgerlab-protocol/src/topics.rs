//! Well-known rendezvous topics

use ledgerlab_core::{Command, PeerPacket, TestgroundConfig};
use std::fmt;
use std::marker::PhantomData;

/// A topic name bound to the message type it carries
pub struct Topic<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Topic<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Topic<T> {}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.name)
    }
}

/// Followers publish their bootstrap contribution here
pub const PEER_PACKETS: Topic<PeerPacket> = Topic::new("peer_packets");

/// The leader publishes the network configuration here, once
pub const TESTGROUND_CONFIG: Topic<TestgroundConfig> = Topic::new("testground_config");

/// Lifecycle commands from the leader
pub const COMMANDS: Topic<Command> = Topic::new("commands");

/// Every well-known topic name
pub fn all() -> [&'static str; 3] {
    [PEER_PACKETS.name(), TESTGROUND_CONFIG.name(), COMMANDS.name()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names_are_distinct() {
        let names = all();
        assert_eq!(names.len(), 3);
        assert_ne!(names[0], names[1]);
        assert_ne!(names[1], names[2]);
        assert_ne!(names[0], names[2]);
    }
}
