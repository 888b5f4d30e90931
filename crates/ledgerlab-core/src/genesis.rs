//! Genesis document and a deterministic reference builder

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::ledger::GenesisBuilder;
use crate::types::{hex_bytes_seq, AccountId, PublicKey};
use crate::{HarnessError, Result};

/// Balance given to every bootstrap account by the reference builder
pub const DEFAULT_INITIAL_BALANCE: u64 = 1_000_000_000_000;

/// A funded account in genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: AccountId,
    pub balance: u64,
}

/// Initial state all nodes must agree on before consensus begins
///
/// The JSON encoding produced by [`GenesisDocument::to_bytes`] is canonical:
/// field order is fixed and every sequence keeps its construction order, so
/// equal documents encode to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDocument {
    pub chain_id: String,
    pub genesis_time: DateTime<Utc>,
    pub validators: Vec<PublicKey>,
    pub funded_accounts: Vec<GenesisAccount>,
    #[serde(with = "hex_bytes_seq")]
    pub bootstrap_txs: Vec<Vec<u8>>,
}

impl GenesisDocument {
    /// Canonical encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Hex SHA-256 of the canonical encoding
    pub fn hash(&self) -> Result<String> {
        Ok(hex::encode(Sha256::digest(self.to_bytes()?)))
    }
}

/// Pure genesis builder: output depends only on its inputs and settings
#[derive(Debug, Clone)]
pub struct DeterministicGenesisBuilder {
    pub genesis_time: DateTime<Utc>,
    pub initial_balance: u64,
}

impl Default for DeterministicGenesisBuilder {
    fn default() -> Self {
        Self {
            genesis_time: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
            initial_balance: DEFAULT_INITIAL_BALANCE,
        }
    }
}

impl DeterministicGenesisBuilder {
    pub fn new(genesis_time: DateTime<Utc>) -> Self {
        Self {
            genesis_time,
            ..Default::default()
        }
    }
}

impl GenesisBuilder for DeterministicGenesisBuilder {
    fn build_genesis(
        &self,
        chain_id: &str,
        bootstrap_txs: Vec<Vec<u8>>,
        accounts: Vec<AccountId>,
        pubkeys: Vec<PublicKey>,
    ) -> Result<GenesisDocument> {
        if chain_id.is_empty() {
            return Err(HarnessError::Config("chain id must not be empty".into()));
        }

        let mut seen_accounts = BTreeSet::new();
        for account in &accounts {
            if !seen_accounts.insert(account) {
                return Err(HarnessError::Config(format!(
                    "account {} funded twice",
                    account
                )));
            }
        }

        let mut seen_keys = BTreeSet::new();
        for key in &pubkeys {
            if !seen_keys.insert(key) {
                return Err(HarnessError::Config(format!("validator key {} listed twice", key)));
            }
        }

        Ok(GenesisDocument {
            chain_id: chain_id.to_string(),
            genesis_time: self.genesis_time,
            validators: pubkeys,
            funded_accounts: accounts
                .into_iter()
                .map(|address| GenesisAccount {
                    address,
                    balance: self.initial_balance,
                })
                .collect(),
            bootstrap_txs,
        })
    }
}
