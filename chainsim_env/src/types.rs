//! Common value types shared by the application, the generator and the harness.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Simulation seed.
///
/// Signed to match the range drawn by the campaign (non-negative 63-bit values),
/// while still accepting any user-supplied value.
pub type Seed = i64;

/// A 32-byte digest summarizing the committed key-value store at a height.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateCommitment([u8; 32]);

impl StateCommitment {
    /// Size of the commitment in bytes.
    pub const BYTES: usize = 32;

    /// Commitment of a store that has never been committed.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding of the full digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Check if this is the zero commitment.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for StateCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "StateCommitment({}..{})", &hex[..8], &hex[56..])
    }
}

impl fmt::Display for StateCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Identifier of the last commit: version (block height) plus digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitId {
    pub version: u64,
    pub hash: StateCommitment,
}

impl Default for StateCommitment {
    fn default() -> Self {
        Self::ZERO
    }
}

/// A raw key/value pair from one namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvPair {
    /// Creates a pair from anything byte-like.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Read-only, ordered view of one namespace of an application's store.
///
/// Keys iterate in lexicographic byte order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceSnapshot {
    namespace: String,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl NamespaceSnapshot {
    /// Creates an empty snapshot for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Builds a snapshot from unordered pairs. Later duplicates win.
    pub fn from_pairs(namespace: impl Into<String>, pairs: impl IntoIterator<Item = KvPair>) -> Self {
        let mut snapshot = Self::new(namespace);
        for pair in pairs {
            snapshot.entries.insert(pair.key, pair.value);
        }
        snapshot
    }

    /// Namespace this snapshot was taken from.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Inserts or replaces a key.
    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Iterates the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.entries.keys().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a copy with the given keys removed.
    pub fn without_keys(&self, keys: &[Vec<u8>]) -> Self {
        let mut copy = self.clone();
        for key in keys {
            copy.entries.remove(key);
        }
        copy
    }
}

/// Header of the block currently being executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: u64,
    /// Block time, unix seconds
    pub time: i64,
    /// Address of the proposing validator
    pub proposer: String,
}

/// Consensus parameters carried alongside an exported state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub block: BlockParams,
    pub evidence: EvidenceParams,
    pub validator: ValidatorParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParams {
    pub max_bytes: i64,
    pub max_gas: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceParams {
    pub max_age_num_blocks: i64,
    pub max_age_duration_secs: i64,
    pub max_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorParams {
    pub pub_key_types: Vec<String>,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            block: BlockParams {
                max_bytes: 200_000,
                max_gas: 2_000_000,
            },
            evidence: EvidenceParams {
                max_age_num_blocks: 302_400,
                max_age_duration_secs: 1_814_400,
                max_bytes: 10_000,
            },
            validator: ValidatorParams {
                pub_key_types: vec!["ed25519".to_string()],
            },
        }
    }
}

/// A validator entry of an exported state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedValidator {
    pub address: String,
    pub power: i64,
}

/// Full application state exported at a height.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedApp {
    /// Serialized application state document (codec-defined, JSON for the ledger)
    pub app_state: Vec<u8>,
    /// Validator set at export time
    pub validators: Vec<ExportedValidator>,
    /// Height the state was exported at
    pub height: u64,
    pub consensus_params: ConsensusParams,
}

/// Where an application instance keeps its store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Pure in-memory store, discarded with the instance
    Memory,
    /// On-disk store rooted at the given directory
    Disk(PathBuf),
}

/// Backing-store statistics, reported when durable commits are requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub namespaces: usize,
    pub keys: u64,
    pub bytes: u64,
    /// Only known for on-disk stores
    pub size_on_disk: Option<u64>,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "namespaces={} keys={} bytes={}",
            self.namespaces, self.keys, self.bytes
        )?;
        if let Some(size) = self.size_on_disk {
            write!(f, " size_on_disk={}", size)?;
        }
        Ok(())
    }
}

/// A simulated account able to sign operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimAccount {
    pub address: String,
    pub public_key: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_iterates_in_key_order() {
        let snapshot = NamespaceSnapshot::from_pairs(
            "bank",
            vec![
                KvPair::new(b"b".to_vec(), b"2".to_vec()),
                KvPair::new(b"a".to_vec(), b"1".to_vec()),
                KvPair::new(vec![0x00, 0xff], b"0".to_vec()),
            ],
        );

        let keys: Vec<&[u8]> = snapshot.keys().collect();
        assert_eq!(keys, vec![&[0x00u8, 0xff][..], &b"a"[..], &b"b"[..]]);
    }

    #[test]
    fn test_without_keys_leaves_original_untouched() {
        let mut snapshot = NamespaceSnapshot::new("wasm");
        snapshot.insert(b"counter".to_vec(), b"7".to_vec());
        snapshot.insert(b"code".to_vec(), b"x".to_vec());

        let pruned = snapshot.without_keys(&[b"counter".to_vec()]);
        assert_eq!(pruned.len(), 1);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(pruned.namespace(), "wasm");
    }

    #[test]
    fn test_commitment_display() {
        let commitment = StateCommitment::from_bytes([0xab; 32]);
        assert_eq!(commitment.to_string().len(), 64);
        assert!(format!("{:?}", commitment).starts_with("StateCommitment(abababab"));
        assert!(StateCommitment::ZERO.is_zero());
    }
}
