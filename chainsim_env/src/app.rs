//! Application capability traits consumed by the verification harness.

use crate::error::EnvError;
use crate::types::{CommitId, ExportedApp, NamespaceSnapshot, StoreLocation, StoreStats};

/// Capabilities the harness needs from a simulated application instance.
///
/// The harness never looks inside the application. It only reads committed
/// state per namespace, exports and re-imports whole states, and asks for
/// the latest commit.
///
/// # Implementations
///
/// - **Ledger**: `chainsim_core::ledger::LedgerApp`, a multi-module reference ledger
/// - **Tests**: small in-memory fakes that return fixed snapshots
pub trait SimApplication {
    /// Application name, used to check both sides of a comparison are alike.
    fn name(&self) -> &str;

    /// Height of the last committed block (0 before the first commit).
    fn last_block_height(&self) -> u64;

    /// Version and digest of the last commit.
    fn last_commit_id(&self) -> CommitId;

    /// Ordered, read-only view of one namespace's committed contents.
    fn namespace_store(&self, namespace: &str) -> Result<NamespaceSnapshot, EnvError>;

    /// Exports the full application state at the last committed height.
    fn export_state(&self) -> Result<ExportedApp, EnvError>;

    /// Initializes a fresh instance from an export, at the export's height.
    ///
    /// Consensus parameters carried in the export are stored as well, and
    /// the result is committed so it can be read back via `namespace_store`.
    fn init_from_export(&mut self, exported: &ExportedApp) -> Result<(), EnvError>;

    /// Backing-store statistics, if the store keeps any.
    fn store_stats(&self) -> Option<StoreStats> {
        None
    }
}

/// Options applied when opening a new application instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppOptions {
    /// Use the flat, non-authenticated commitment instead of the
    /// per-namespace tree commitment.
    pub faux_merkle: bool,
}

impl AppOptions {
    pub fn with_faux_merkle(mut self, enabled: bool) -> Self {
        self.faux_merkle = enabled;
        self
    }
}

/// Creates fresh application instances.
pub trait AppFactory {
    /// Application type produced by this factory.
    type App: SimApplication;

    /// Name every instance reports through [`SimApplication::name`].
    fn app_name(&self) -> &str;

    /// Opens a new, empty instance backed by the given location.
    fn new_instance(
        &self,
        location: &StoreLocation,
        options: &AppOptions,
    ) -> Result<Self::App, EnvError>;
}
