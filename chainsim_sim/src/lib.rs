//! ChainSim Determinism Harness
//!
//! Drives a replicated state machine through seeded random operation
//! sequences and checks two properties of the resulting state:
//!
//! - **Determinism**: repeated runs of the same seed commit bit-identical
//!   state (outer seeds × inner repetitions)
//! - **Export/import consistency**: a state exported from one instance and
//!   imported into a fresh one matches key by key, modulo declared volatile
//!   key ranges
//!
//! # Architecture
//!
//! ```text
//! Provisioner ──▶ RandomOperationGenerator ──▶ AppFactory::App (LedgerApp)
//!                                                     │
//!                      ┌──────────────────────────────┴──────────────┐
//!                      ▼                                             ▼
//!            determinism campaign                        export/import runner
//!            commitment[r] == commitment[0]              comparator + reporter
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use chainsim_sim::{run_determinism_campaign, CampaignConfig, RandomOperationGenerator, SimulationConfig};
//! use chainsim_core::LedgerAppFactory;
//!
//! let config = SimulationConfig::default().with_seed(42);
//! let report = run_determinism_campaign(
//!     &LedgerAppFactory,
//!     RandomOperationGenerator::from_config,
//!     &config,
//!     &CampaignConfig::default(),
//! )?;
//! ```

mod config;
mod determinism;
mod error;
mod exporter;
mod generator;
mod genesis;
mod import_export;
mod keys;
mod runner;

pub use config::{CampaignConfig, SimulationConfig, SIMULATION_CHAIN_ID};
pub use determinism::{campaign_config, run_determinism_campaign, CampaignReport, SeedReport, REFLECT_CONTRACT_CODE};
pub use error::SimError;
pub use exporter::{check_export_simulation, ensure_export_dirs, print_stats, write_params, write_stats, StateExport};
pub use generator::{RandomOperationGenerator, CONTRACT_CODE_PARAM};
pub use genesis::{check_inputs, Provisioned, Provisioner};
pub use import_export::{compare_app_stores, run_import_export, ConsistencyReport, NamespaceReport};
pub use keys::{address_of, sim_account, DeterministicKeyProvider, ADDRESS_PREFIX};
pub use runner::{check_app_name, run_simulation, setup, SimInstance};
