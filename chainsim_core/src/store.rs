//! The versioned multi-namespace store backing simulated applications.
//!
//! Writes go through two overlays before reaching the backend:
//! - an operation cache, written through on success or discarded on failure
//! - the block's pending writes, flushed to the backend on `commit`
//!
//! Readers of committed state (`snapshot`, the comparator) never see either
//! overlay.

use chainsim_env::{CommitId, EnvError, NamespaceSnapshot, StateCommitment, StoreStats};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Store-level errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    #[error("No operation cache is open")]
    NoCache,
}

impl From<StoreError> for EnvError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownNamespace(ns) => EnvError::UnknownNamespace(ns),
            other => EnvError::store(other.to_string()),
        }
    }
}

/// Pending writes for one namespace. `None` marks a deletion.
type WriteSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

// ============================================================================
// BACKENDS
// ============================================================================

/// Durable (or not) storage of committed key/value pairs, one tree per namespace.
pub trait KvBackend: Send {
    fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Applies a batch of writes and deletions to one namespace.
    fn apply(&mut self, namespace: &str, writes: &WriteSet) -> Result<(), StoreError>;

    /// All pairs whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, namespace: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Makes applied writes durable.
    fn flush(&self) -> Result<(), StoreError>;

    fn size_on_disk(&self) -> Option<u64> {
        None
    }
}

/// Purely in-memory backend.
#[derive(Debug, Default)]
pub struct MemBackend {
    trees: BTreeMap<String, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemBackend {
    fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.trees.get(namespace).and_then(|t| t.get(key).cloned()))
    }

    fn apply(&mut self, namespace: &str, writes: &WriteSet) -> Result<(), StoreError> {
        let tree = self.trees.entry(namespace.to_string()).or_default();
        for (key, value) in writes {
            match value {
                Some(v) => {
                    tree.insert(key.clone(), v.clone());
                }
                None => {
                    tree.remove(key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, namespace: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let Some(tree) = self.trees.get(namespace) else {
            return Ok(Vec::new());
        };
        Ok(tree
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Sled-based backend.
///
/// Each namespace maps to its own sled tree.
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Backend(format!("Failed to open sled DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Create a temporary store, removed when dropped
    #[cfg(test)]
    pub fn open_temp() -> Result<Self, StoreError> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| StoreError::Backend(format!("Failed to open temp DB: {}", e)))?;
        Ok(Self { db })
    }

    fn tree(&self, namespace: &str) -> Result<sled::Tree, StoreError> {
        self.db
            .open_tree(namespace)
            .map_err(|e| StoreError::Backend(format!("Failed to open tree {}: {}", namespace, e)))
    }
}

impl KvBackend for SledBackend {
    fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .tree(namespace)?
            .get(key)
            .map_err(|e| StoreError::Backend(format!("Get failed: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn apply(&mut self, namespace: &str, writes: &WriteSet) -> Result<(), StoreError> {
        let tree = self.tree(namespace)?;
        let mut batch = sled::Batch::default();
        for (key, value) in writes {
            match value {
                Some(v) => batch.insert(key.as_slice(), v.as_slice()),
                None => batch.remove(key.as_slice()),
            }
        }
        tree.apply_batch(batch)
            .map_err(|e| StoreError::Backend(format!("Batch failed: {}", e)))
    }

    fn scan_prefix(&self, namespace: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut pairs = Vec::new();
        for result in self.tree(namespace)?.scan_prefix(prefix) {
            let (key, value) = result
                .map_err(|e| StoreError::Backend(format!("Iteration failed: {}", e)))?;
            pairs.push((key.to_vec(), value.to_vec()));
        }
        Ok(pairs)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Backend(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn size_on_disk(&self) -> Option<u64> {
        self.db.size_on_disk().ok()
    }
}

// ============================================================================
// MULTI STORE
// ============================================================================

/// How the commit digest is derived from the committed contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitmentMode {
    /// Per-namespace roots folded into one digest
    #[default]
    Tree,
    /// One flat hash over every pair (faster, not per-namespace provable)
    Flat,
}

/// Multi-namespace store with block-level commits and an operation cache.
pub struct MultiStore {
    backend: Box<dyn KvBackend>,

    /// Registered namespaces, sorted
    namespaces: Vec<String>,

    /// Writes of the current block, not yet committed
    pending: BTreeMap<String, WriteSet>,

    /// Writes of the current operation, if a cache is open
    cache: Option<BTreeMap<String, WriteSet>>,

    mode: CommitmentMode,

    last_commit: CommitId,
}

impl MultiStore {
    /// Creates a store over `backend` serving the given namespaces.
    pub fn new(backend: Box<dyn KvBackend>, namespaces: &[&str], mode: CommitmentMode) -> Self {
        let mut namespaces: Vec<String> = namespaces.iter().map(|s| s.to_string()).collect();
        namespaces.sort();
        namespaces.dedup();
        Self {
            backend,
            namespaces,
            pending: BTreeMap::new(),
            cache: None,
            mode,
            last_commit: CommitId::default(),
        }
    }

    /// In-memory store.
    pub fn in_memory(namespaces: &[&str], mode: CommitmentMode) -> Self {
        Self::new(Box::new(MemBackend::new()), namespaces, mode)
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn last_commit(&self) -> CommitId {
        self.last_commit
    }

    fn check_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        if self.namespaces.binary_search_by(|n| n.as_str().cmp(namespace)).is_ok() {
            Ok(())
        } else {
            Err(StoreError::UnknownNamespace(namespace.to_string()))
        }
    }

    // ------------------------------------------------------------------------
    // Working-state access (sees pending writes and the open cache)
    // ------------------------------------------------------------------------

    pub fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_namespace(namespace)?;
        if let Some(write) = self
            .cache
            .as_ref()
            .and_then(|c| c.get(namespace))
            .and_then(|w| w.get(key))
        {
            return Ok(write.clone());
        }
        if let Some(write) = self.pending.get(namespace).and_then(|w| w.get(key)) {
            return Ok(write.clone());
        }
        self.backend.get(namespace, key)
    }

    pub fn set(&mut self, namespace: &str, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.check_namespace(namespace)?;
        self.write_set(namespace).insert(key, Some(value));
        Ok(())
    }

    pub fn delete(&mut self, namespace: &str, key: &[u8]) -> Result<(), StoreError> {
        self.check_namespace(namespace)?;
        self.write_set(namespace).insert(key.to_vec(), None);
        Ok(())
    }

    fn write_set(&mut self, namespace: &str) -> &mut WriteSet {
        let layer = match self.cache.as_mut() {
            Some(cache) => cache,
            None => &mut self.pending,
        };
        layer.entry(namespace.to_string()).or_default()
    }

    /// Working-state pairs under `prefix`, in ascending key order.
    pub fn prefix_scan(&self, namespace: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.check_namespace(namespace)?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.backend.scan_prefix(namespace, prefix)?.into_iter().collect();

        let layers = std::iter::once(self.pending.get(namespace))
            .chain(std::iter::once(self.cache.as_ref().and_then(|c| c.get(namespace))))
            .flatten();
        for writes in layers {
            for (key, value) in writes.range(prefix.to_vec()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                match value {
                    Some(v) => {
                        merged.insert(key.clone(), v.clone());
                    }
                    None => {
                        merged.remove(key);
                    }
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    // ------------------------------------------------------------------------
    // Operation cache
    // ------------------------------------------------------------------------

    /// Opens a cache; subsequent writes land in it until written or discarded.
    pub fn begin_cache(&mut self) {
        self.cache = Some(BTreeMap::new());
    }

    /// Moves the cached writes into the block's pending writes.
    pub fn write_cache(&mut self) -> Result<(), StoreError> {
        let cache = self.cache.take().ok_or(StoreError::NoCache)?;
        for (namespace, writes) in cache {
            self.pending.entry(namespace).or_default().extend(writes);
        }
        Ok(())
    }

    /// Drops the cached writes.
    pub fn discard_cache(&mut self) {
        self.cache = None;
    }

    // ------------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------------

    /// Flushes pending writes and computes the commitment for `height`.
    pub fn commit(&mut self, height: u64) -> Result<CommitId, StoreError> {
        self.cache = None;
        let pending = std::mem::take(&mut self.pending);
        for (namespace, writes) in &pending {
            self.backend.apply(namespace, writes)?;
        }
        self.backend.flush()?;

        let hash = self.compute_commitment(height)?;
        self.last_commit = CommitId { version: height, hash };
        debug!(height, hash = %hash, "store committed");
        Ok(self.last_commit)
    }

    fn compute_commitment(&self, height: u64) -> Result<StateCommitment, StoreError> {
        let mut outer = blake3::Hasher::new();
        outer.update(&height.to_be_bytes());

        for namespace in &self.namespaces {
            let pairs = self.backend.scan_prefix(namespace, &[])?;
            match self.mode {
                CommitmentMode::Tree => {
                    let mut inner = blake3::Hasher::new();
                    for (key, value) in &pairs {
                        hash_pair(&mut inner, key, value);
                    }
                    hash_bytes(&mut outer, namespace.as_bytes());
                    outer.update(inner.finalize().as_bytes());
                }
                CommitmentMode::Flat => {
                    hash_bytes(&mut outer, namespace.as_bytes());
                    for (key, value) in &pairs {
                        hash_pair(&mut outer, key, value);
                    }
                }
            }
        }
        Ok(StateCommitment::from_bytes(*outer.finalize().as_bytes()))
    }

    /// Whether the open block or an operation cache holds writes.
    pub fn has_uncommitted(&self) -> bool {
        self.cache.is_some() || self.pending.values().any(|writes| !writes.is_empty())
    }

    /// In-memory copy of the committed contents, at the same last commit.
    pub fn committed_copy(&self) -> Result<MultiStore, StoreError> {
        let mut backend = MemBackend::new();
        for namespace in &self.namespaces {
            let writes: WriteSet = self
                .backend
                .scan_prefix(namespace, &[])?
                .into_iter()
                .map(|(key, value)| (key, Some(value)))
                .collect();
            backend.apply(namespace, &writes)?;
        }
        Ok(Self {
            backend: Box::new(backend),
            namespaces: self.namespaces.clone(),
            pending: BTreeMap::new(),
            cache: None,
            mode: self.mode,
            last_commit: self.last_commit,
        })
    }

    /// Committed contents of one namespace.
    pub fn snapshot(&self, namespace: &str) -> Result<NamespaceSnapshot, StoreError> {
        self.check_namespace(namespace)?;
        let pairs = self.backend.scan_prefix(namespace, &[])?;
        let mut snapshot = NamespaceSnapshot::new(namespace);
        for (key, value) in pairs {
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats {
            namespaces: self.namespaces.len(),
            size_on_disk: self.backend.size_on_disk(),
            ..StoreStats::default()
        };
        for namespace in &self.namespaces {
            for (key, value) in self.backend.scan_prefix(namespace, &[])? {
                stats.keys += 1;
                stats.bytes += (key.len() + value.len()) as u64;
            }
        }
        Ok(stats)
    }
}

fn hash_bytes(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn hash_pair(hasher: &mut blake3::Hasher, key: &[u8], value: &[u8]) {
    hash_bytes(hasher, key);
    hash_bytes(hasher, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &[&str] = &["bank", "staking"];

    #[test]
    fn test_pending_writes_invisible_to_snapshot() {
        let mut store = MultiStore::in_memory(NS, CommitmentMode::Tree);
        store.set("bank", b"a".to_vec(), b"1".to_vec()).unwrap();

        assert_eq!(store.get("bank", b"a").unwrap(), Some(b"1".to_vec()));
        assert!(store.snapshot("bank").unwrap().is_empty());

        store.commit(1).unwrap();
        assert_eq!(store.snapshot("bank").unwrap().get(b"a"), Some(&b"1"[..]));
    }

    #[test]
    fn test_committed_copy_drops_open_block() {
        let mut store = MultiStore::in_memory(NS, CommitmentMode::Flat);
        store.set("bank", b"a".to_vec(), b"1".to_vec()).unwrap();
        let committed = store.commit(1).unwrap();
        assert!(!store.has_uncommitted());

        store.set("bank", b"a".to_vec(), b"2".to_vec()).unwrap();
        store.begin_cache();
        store.set("staking", b"v".to_vec(), b"10".to_vec()).unwrap();
        assert!(store.has_uncommitted());

        let copy = store.committed_copy().unwrap();
        assert!(!copy.has_uncommitted());
        assert_eq!(copy.last_commit(), committed);
        assert_eq!(copy.get("bank", b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(copy.get("staking", b"v").unwrap(), None);
        assert_eq!(store.get("bank", b"a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_discarded_cache_leaves_no_trace() {
        let mut store = MultiStore::in_memory(NS, CommitmentMode::Tree);
        store.set("bank", b"a".to_vec(), b"1".to_vec()).unwrap();

        store.begin_cache();
        store.set("bank", b"a".to_vec(), b"2".to_vec()).unwrap();
        store.delete("bank", b"a").unwrap();
        assert_eq!(store.get("bank", b"a").unwrap(), None);
        store.discard_cache();

        assert_eq!(store.get("bank", b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_written_cache_reaches_commit() {
        let mut store = MultiStore::in_memory(NS, CommitmentMode::Tree);
        store.begin_cache();
        store.set("staking", b"v".to_vec(), b"10".to_vec()).unwrap();
        store.write_cache().unwrap();
        store.commit(1).unwrap();

        assert_eq!(store.snapshot("staking").unwrap().len(), 1);
        assert!(matches!(store.write_cache(), Err(StoreError::NoCache)));
    }

    #[test]
    fn test_prefix_scan_merges_layers() {
        let mut store = MultiStore::in_memory(NS, CommitmentMode::Tree);
        store.set("bank", vec![0x02, 1], b"x".to_vec()).unwrap();
        store.set("bank", vec![0x02, 2], b"y".to_vec()).unwrap();
        store.set("bank", vec![0x03, 1], b"z".to_vec()).unwrap();
        store.commit(1).unwrap();

        store.delete("bank", &[0x02, 1]).unwrap();
        store.begin_cache();
        store.set("bank", vec![0x02, 0], b"w".to_vec()).unwrap();

        let keys: Vec<Vec<u8>> = store
            .prefix_scan("bank", &[0x02])
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![vec![0x02, 0], vec![0x02, 2]]);
    }

    #[test]
    fn test_commitment_depends_on_contents_and_height() {
        let build = |value: &[u8], height: u64| {
            let mut store = MultiStore::in_memory(NS, CommitmentMode::Tree);
            store.set("bank", b"k".to_vec(), value.to_vec()).unwrap();
            store.commit(height).unwrap().hash
        };

        assert_eq!(build(b"1", 1), build(b"1", 1));
        assert_ne!(build(b"1", 1), build(b"2", 1));
        assert_ne!(build(b"1", 1), build(b"1", 2));
    }

    #[test]
    fn test_flat_and_tree_modes_differ() {
        let mut tree = MultiStore::in_memory(NS, CommitmentMode::Tree);
        let mut flat = MultiStore::in_memory(NS, CommitmentMode::Flat);
        for store in [&mut tree, &mut flat] {
            store.set("bank", b"k".to_vec(), b"v".to_vec()).unwrap();
        }
        assert_ne!(tree.commit(1).unwrap().hash, flat.commit(1).unwrap().hash);
    }

    #[test]
    fn test_unknown_namespace_rejected() {
        let store = MultiStore::in_memory(NS, CommitmentMode::Tree);
        assert!(matches!(
            store.get("gov", b"k"),
            Err(StoreError::UnknownNamespace(_))
        ));
    }

    #[test]
    fn test_sled_backend_matches_memory_backend() {
        let mut mem = MultiStore::in_memory(NS, CommitmentMode::Tree);
        let mut sled = MultiStore::new(
            Box::new(SledBackend::open_temp().unwrap()),
            NS,
            CommitmentMode::Tree,
        );

        for store in [&mut mem, &mut sled] {
            store.set("bank", b"a".to_vec(), b"1".to_vec()).unwrap();
            store.set("staking", b"b".to_vec(), b"2".to_vec()).unwrap();
            store.commit(1).unwrap();
            store.delete("bank", b"a").unwrap();
            store.commit(2).unwrap();
        }

        assert_eq!(mem.last_commit(), sled.last_commit());
        assert_eq!(mem.snapshot("staking").unwrap(), sled.snapshot("staking").unwrap());
        assert!(sled.stats().unwrap().size_on_disk.is_some());
    }

    #[test]
    fn test_sled_backend_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MultiStore::new(
            Box::new(SledBackend::open(dir.path().join("db")).unwrap()),
            NS,
            CommitmentMode::Flat,
        );
        store.set("bank", b"a".to_vec(), b"1".to_vec()).unwrap();
        store.commit(1).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.bytes, 2);
    }
}
