//! Error types for the simulation environment abstraction.

use thiserror::Error;

/// Errors surfaced by an application, its store or the parameter codec.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Backing store read/write/commit failed
    #[error("Store error: {0}")]
    StoreError(String),

    /// Namespace is not registered by the application
    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    /// State document or parameter (de)serialization failed
    #[error("Codec error: {0}")]
    CodecError(String),

    /// Exporting application state failed
    #[error("Export error: {0}")]
    ExportError(String),

    /// Initializing an application from exported state failed
    #[error("Import error: {0}")]
    ImportError(String),

    /// Block execution or an invariant check failed
    #[error("Simulation error: {0}")]
    SimulationError(String),
}

impl EnvError {
    /// Creates a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    /// Creates a codec error.
    pub fn codec(msg: impl std::fmt::Display) -> Self {
        Self::CodecError(msg.to_string())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::ExportError(msg.into())
    }

    pub fn import(msg: impl Into<String>) -> Self {
        Self::ImportError(msg.into())
    }

    pub fn simulation(msg: impl Into<String>) -> Self {
        Self::SimulationError(msg.into())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::codec(err)
    }
}
