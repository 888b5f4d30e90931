//! Ledger-facing value types
//!
//! Keys, hashes, blocks and transaction results as the harness sees them.
//! Binary fields serialize as lowercase hex so that JSON encodings stay
//! canonical and readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::{HarnessError, Result};

/// Position of a committed block
pub type Height = i64;

/// Result code the ledger uses for accepted transactions
pub const CODE_OK: u32 = 0;

/// Size of a serialized public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Account address length in bytes (hex-encoded in `AccountId`)
pub const ADDRESS_SIZE: usize = 20;

/// A participant's public key
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Create from raw bytes, checking the size
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(HarnessError::Codec(format!(
                "incorrect pubkey size: {} (expected {})",
                bytes.len(),
                PUBLIC_KEY_SIZE
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Decode a hex-encoded key
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| HarnessError::Codec(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A pre-funded account address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Derive an address from a public key (first 20 bytes of its SHA-256)
    pub fn from_public_key(key: &PublicKey) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        Self(hex::encode(&digest[..ADDRESS_SIZE]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// SHA-256 transaction hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    /// Hash raw transaction bytes
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for TxHash {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| HarnessError::Codec(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| HarnessError::Codec(format!("tx hash must be 32 bytes: {}", s)))?;
        Ok(Self(arr))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A signed, encoded transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx(#[serde(with = "hex_bytes")] pub Vec<u8>);

impl SignedTx {
    pub fn hash(&self) -> TxHash {
        TxHash::of(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Header information of a committed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: Height,
    pub time: DateTime<Utc>,
    /// Encoded size in bytes
    pub size: usize,
    pub tx_count: usize,
}

/// Notification produced by the block-event subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCommitted {
    pub height: Height,
    pub time: DateTime<Utc>,
    pub size: usize,
}

impl From<&BlockInfo> for BlockCommitted {
    fn from(block: &BlockInfo) -> Self {
        Self {
            height: block.height,
            time: block.time,
            size: block.size,
        }
    }
}

/// Node status summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub latest_height: Height,
}

/// A committed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub hash: TxHash,
    pub height: Height,
    pub code: u32,
    pub raw_log: String,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// How long `broadcast` waits before returning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// Return after mempool admission
    Sync,
    /// Return immediately
    Async,
    /// Return after the transaction is committed
    Block,
}

impl fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastMode::Sync => f.write_str("sync"),
            BroadcastMode::Async => f.write_str("async"),
            BroadcastMode::Block => f.write_str("block"),
        }
    }
}

impl FromStr for BroadcastMode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sync" => Ok(BroadcastMode::Sync),
            "async" => Ok(BroadcastMode::Async),
            "block" => Ok(BroadcastMode::Block),
            other => Err(HarnessError::Config(format!(
                "unsupported broadcast mode {}; supported modes: sync, async, block",
                other
            ))),
        }
    }
}

/// Ledger response to a broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub code: u32,
    pub hash: TxHash,
    pub raw_log: String,
}

impl BroadcastResponse {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// Map a non-zero result code to an error
    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(HarnessError::Broadcast {
                code: self.code,
                log: self.raw_log,
            })
        }
    }
}

/// Serde adapter encoding byte vectors as hex strings
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for sequences of byte vectors
pub mod hex_bytes_seq {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: Vec<String> = items.iter().map(hex::encode).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_hex_roundtrip_and_size_check() {
        let key = PublicKey::from_bytes(&[7u8; PUBLIC_KEY_SIZE]).unwrap();
        assert_eq!(PublicKey::from_hex(&key.to_hex()).unwrap(), key);

        let err = PublicKey::from_bytes(&[1u8; 33]).unwrap_err();
        assert!(err.to_string().contains("incorrect pubkey size"));
        assert!(PublicKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_account_derivation_is_stable() {
        let key = PublicKey::from_bytes(&[3u8; PUBLIC_KEY_SIZE]).unwrap();
        let a = AccountId::from_public_key(&key);
        let b = AccountId::from_public_key(&key);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), ADDRESS_SIZE * 2);
    }

    #[test]
    fn test_tx_hash_parse() {
        let tx = SignedTx(b"hello".to_vec());
        let hash = tx.hash();
        let parsed: TxHash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
        assert!("abcd".parse::<TxHash>().is_err());
    }

    #[test]
    fn test_broadcast_mode_parse() {
        assert_eq!("block".parse::<BroadcastMode>().unwrap(), BroadcastMode::Block);
        let err = "commit".parse::<BroadcastMode>().unwrap_err();
        assert!(err.to_string().contains("supported modes: sync, async, block"));
    }

    #[test]
    fn test_broadcast_response_code_mapping() {
        let hash = TxHash::of(b"x");
        let ok = BroadcastResponse { code: CODE_OK, hash, raw_log: String::new() };
        assert!(ok.into_result().is_ok());

        let rejected = BroadcastResponse { code: 11, hash, raw_log: "out of gas".into() };
        match rejected.into_result() {
            Err(HarnessError::Broadcast { code, log }) => {
                assert_eq!(code, 11);
                assert_eq!(log, "out of gas");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
