//! Simulation and campaign configuration.

use chainsim_env::{RunParams, Seed};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Chain id every campaign run uses.
pub const SIMULATION_CHAIN_ID: &str = "simulation-app";

/// Configuration for a simulation run.
///
/// Built once per campaign and handed to the runners by reference. Runners
/// that need different settings derive a modified copy instead of mutating
/// the caller's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Genesis document to start from (mutually exclusive with `params_file`)
    pub genesis_file: Option<PathBuf>,

    /// Simulation-parameters document (mutually exclusive with `genesis_file`)
    pub params_file: Option<PathBuf>,

    /// Where to write the exported application state after a run
    pub export_state_path: Option<PathBuf>,

    /// Where to write the simulation parameters used by a run
    pub export_params_path: Option<PathBuf>,

    /// Where to write the operation statistics of a run
    pub export_stats_path: Option<PathBuf>,

    /// Master seed
    pub seed: Seed,

    /// Height of the first block
    pub initial_height: u64,

    /// Number of blocks per run
    pub num_blocks: u64,

    /// Mean operations per block
    pub block_size: u32,

    pub chain_id: String,

    /// Genesis time, unix seconds (None = wall clock at provisioning)
    pub genesis_time: Option<i64>,

    /// Commit to a persistent store and report its statistics
    pub commit: bool,

    /// Check all invariants after every block
    pub all_invariants: bool,

    /// Check invariants after every operation
    pub on_operation: bool,

    /// Invariant check period in blocks
    pub invariant_period: u64,

    /// Suppress per-operation logging
    pub lean: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            genesis_file: None,
            params_file: None,
            export_state_path: None,
            export_params_path: None,
            export_stats_path: None,
            seed: 42,
            initial_height: 1,
            num_blocks: 50,
            block_size: 20,
            chain_id: SIMULATION_CHAIN_ID.to_string(),
            genesis_time: None,
            commit: false,
            all_invariants: false,
            on_operation: false,
            invariant_period: 1,
            lean: false,
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_genesis_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.genesis_file = Some(path.into());
        self
    }

    pub fn with_params_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.params_file = Some(path.into());
        self
    }

    pub fn with_export_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_state_path = Some(path.into());
        self
    }

    pub fn with_export_params_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_params_path = Some(path.into());
        self
    }

    pub fn with_export_stats_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_stats_path = Some(path.into());
        self
    }

    pub fn with_initial_height(mut self, height: u64) -> Self {
        self.initial_height = height;
        self
    }

    pub fn with_num_blocks(mut self, blocks: u64) -> Self {
        self.num_blocks = blocks;
        self
    }

    pub fn with_block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    pub fn with_genesis_time(mut self, unix_secs: i64) -> Self {
        self.genesis_time = Some(unix_secs);
        self
    }

    pub fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn with_all_invariants(mut self, enabled: bool) -> Self {
        self.all_invariants = enabled;
        self
    }

    pub fn with_on_operation(mut self, enabled: bool) -> Self {
        self.on_operation = enabled;
        self
    }

    pub fn with_invariant_period(mut self, period: u64) -> Self {
        self.invariant_period = period;
        self
    }

    pub fn with_lean(mut self, lean: bool) -> Self {
        self.lean = lean;
        self
    }

    /// Generator settings for one run with `seed`.
    pub fn run_params(&self, seed: Seed) -> RunParams {
        RunParams {
            seed,
            chain_id: self.chain_id.clone(),
            initial_height: self.initial_height,
            num_blocks: self.num_blocks,
            block_size: self.block_size,
            all_invariants: self.all_invariants,
            on_operation: self.on_operation,
            invariant_period: self.invariant_period,
            lean: self.lean,
        }
    }
}

/// Shape of a determinism campaign: outer seeds × inner repetitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub num_seeds: usize,
    pub runs_per_seed: usize,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            num_seeds: 3,
            runs_per_seed: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_leave_other_fields_alone() {
        let config = SimulationConfig::default()
            .with_seed(7)
            .with_num_blocks(3)
            .with_params_file("/tmp/params.json");

        assert_eq!(config.seed, 7);
        assert_eq!(config.num_blocks, 3);
        assert_eq!(config.params_file, Some(PathBuf::from("/tmp/params.json")));
        assert_eq!(config.genesis_file, None);
        assert_eq!(config.chain_id, SIMULATION_CHAIN_ID);
    }

    #[test]
    fn test_run_params_carry_flags() {
        let config = SimulationConfig::default()
            .with_on_operation(true)
            .with_lean(true)
            .with_initial_height(9);
        let run = config.run_params(-5);

        assert_eq!(run.seed, -5);
        assert!(run.on_operation);
        assert!(run.lean);
        assert_eq!(run.initial_height, 9);
        assert_eq!(run.block_size, config.block_size);
    }

    #[test]
    fn test_campaign_defaults() {
        let campaign = CampaignConfig::default();
        assert_eq!((campaign.num_seeds, campaign.runs_per_seed), (3, 5));
    }
}
