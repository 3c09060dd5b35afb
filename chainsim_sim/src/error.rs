//! Harness error types.

use chainsim_core::ledger::AppError;
use chainsim_env::{EnvError, Seed, StateCommitment};
use thiserror::Error;

/// Failures of a determinism campaign or a consistency check.
///
/// Every fatal condition ends the campaign with exactly one of these; the
/// `Display` text is the consolidated diagnostic.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid or mutually exclusive configuration; nothing was run
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Two repetitions of the same seed committed different states.
    ///
    /// Indices are zero-based; the message shows them one-based.
    #[error(
        "non-determinism in seed {seed}: {}/{num_seeds}, attempt: {}/{runs}",
        .seed_index + 1,
        .repetition + 1
    )]
    NonDeterminism {
        seed: Seed,
        seed_index: usize,
        num_seeds: usize,
        repetition: usize,
        runs: usize,
        expected: StateCommitment,
        actual: StateCommitment,
    },

    /// Imported state differs from the exported one outside the exclusions
    #[error("state mismatch after import in namespace {namespace}:\n{log}")]
    Consistency {
        namespace: String,
        divergent: usize,
        log: String,
    },

    /// The comparator returned sides of different lengths
    #[error("comparator invariant breached in namespace {namespace}: {a_len} vs {b_len} divergent pairs")]
    ComparatorInvariant {
        namespace: String,
        a_len: usize,
        b_len: usize,
    },

    /// A run that must succeed did not
    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn simulation(msg: impl Into<String>) -> Self {
        Self::Simulation(msg.into())
    }

    /// Short kind tag used in JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::NonDeterminism { .. } => "non_determinism",
            Self::Consistency { .. } => "consistency",
            Self::ComparatorInvariant { .. } => "comparator_invariant",
            Self::Simulation(_) => "simulation",
            Self::Env(_) => "environment",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

impl From<AppError> for SimError {
    fn from(err: AppError) -> Self {
        Self::Env(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_determinism_message_is_one_based() {
        let err = SimError::NonDeterminism {
            seed: 42,
            seed_index: 0,
            num_seeds: 3,
            repetition: 2,
            runs: 3,
            expected: StateCommitment::ZERO,
            actual: StateCommitment::from_bytes([1; 32]),
        };
        assert_eq!(err.to_string(), "non-determinism in seed 42: 1/3, attempt: 3/3");
        assert_eq!(err.kind(), "non_determinism");
    }

    #[test]
    fn test_comparator_breach_is_distinct() {
        let err = SimError::ComparatorInvariant {
            namespace: "bank".to_string(),
            a_len: 1,
            b_len: 2,
        };
        assert!(err.to_string().starts_with("comparator invariant breached"));
        assert_ne!(err.kind(), "consistency");
    }
}
