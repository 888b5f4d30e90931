//! Per-follower bootstrap contribution

use serde::{Deserialize, Serialize};

use crate::error::BootstrapError;
use crate::types::{hex_bytes, AccountId, PublicKey};

/// Bootstrap information a follower contributes to genesis
///
/// Produced once per follower and immutable afterwards. `participant` is the
/// follower's stable name; the leader orders packets by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPacket {
    pub participant: String,
    pub public_keys: Vec<PublicKey>,
    pub genesis_accounts: Vec<AccountId>,
    #[serde(with = "hex_bytes")]
    pub signed_bootstrap_tx: Vec<u8>,
}

impl PeerPacket {
    pub fn new(
        participant: impl Into<String>,
        public_keys: Vec<PublicKey>,
        genesis_accounts: Vec<AccountId>,
        signed_bootstrap_tx: Vec<u8>,
    ) -> Self {
        Self {
            participant: participant.into(),
            public_keys,
            genesis_accounts,
            signed_bootstrap_tx,
        }
    }

    /// Reject packets genesis construction cannot use
    pub fn validate(&self) -> Result<(), BootstrapError> {
        let invalid = |reason: &str| BootstrapError::InvalidPacket {
            participant: self.participant.clone(),
            reason: reason.to_string(),
        };

        if self.participant.is_empty() {
            return Err(invalid("empty participant name"));
        }
        if self.public_keys.is_empty() {
            return Err(invalid("no public keys"));
        }
        if self.signed_bootstrap_tx.is_empty() {
            return Err(invalid("empty bootstrap transaction"));
        }
        Ok(())
    }
}
