//! ChainSim Core - state comparison and the reference ledger application
//!
//! This library holds the pieces a determinism campaign needs below the
//! simulation driver:
//! 1. **Stores**: namespaced key/value multi-store with an operation cache and
//!    a commitment over committed state (memory or sled backed)
//! 2. **Comparator**: ordered diff of two namespace snapshots with prefix
//!    exclusion and force-deleted keys
//! 3. **Reporter**: per-namespace decoders rendering divergent pairs
//! 4. **Ledger**: a multi-module application (accounts, bank, staking,
//!    distribution, mint, gov, tax, contracts) to exercise all of the above

pub mod diff;
pub mod ledger;
pub mod report;
pub mod store;

// Re-export key types for convenience
pub use diff::{diff_kv_stores, KvDiff, NamespaceComparison};
pub use ledger::{LedgerApp, LedgerAppFactory};
pub use report::{quote_bytes, render_diff, simulation_log, DecoderRegistry};
pub use store::{CommitmentMode, KvBackend, MemBackend, MultiStore, SledBackend, StoreError};
