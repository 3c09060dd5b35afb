//! ChainSim Environment Abstraction Layer
//!
//! This crate defines the seams between the verification harness and the
//! application under test:
//! - the application itself (`SimApplication`, `AppFactory`)
//! - the seeded random block driver (`OperationGenerator`)
//! - per-namespace value rendering (`StoreDecoder`)
//!
//! # Core Concept: Seeded Reproducibility
//!
//! Every random choice of a simulation derives from a single seed, so the
//! committed state digest is a pure function of `(seed, parameters)`. Any
//! run that disagrees with another run of the same seed is a determinism bug.
//!
//! # Example
//!
//! ```ignore
//! use chainsim_env::{AppFactory, AppOptions, OperationGenerator, RunParams, StoreLocation};
//!
//! fn digest<F: AppFactory, G: OperationGenerator<F::App>>(factory: &F, gen: &mut G, seed: i64) {
//!     let mut app = factory.new_instance(&StoreLocation::Memory, &AppOptions::default()).unwrap();
//!     let run = RunParams { seed, ..RunParams::default() };
//!     let outcome = gen.simulate_from_seed(&mut app, &run);
//!     println!("{}", outcome.final_commit.hash);
//! }
//! ```

mod app;
mod decoder;
mod error;
mod generator;
mod types;

pub use app::{AppFactory, AppOptions, SimApplication};
pub use decoder::StoreDecoder;
pub use error::EnvError;
pub use generator::{
    AppParams, OperationCounts, OperationGenerator, OperationStats, RunParams, SimulationOutcome,
};
pub use types::{
    BlockHeader, BlockParams, CommitId, ConsensusParams, EvidenceParams, ExportedApp,
    ExportedValidator, KvPair, NamespaceSnapshot, Seed, SimAccount, StateCommitment,
    StoreLocation, StoreStats, ValidatorParams,
};
