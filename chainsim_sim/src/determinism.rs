//! Determinism campaign: outer seeds × inner repetitions.
//!
//! Every repetition of a seed runs on a fresh in-memory instance and must
//! commit exactly the same state as the first repetition. The first mismatch
//! ends the campaign.
//!
//! ```text
//! Idle ─▶ SeedSelected ─▶ Running(r) ─▶ Committed(r) ─┬─▶ Running(r+1)
//!  ▲                                                  ├─▶ Failed
//!  └──────────────────────────────────────────────────┘ (next seed)
//! ```

use crate::config::{CampaignConfig, SimulationConfig, SIMULATION_CHAIN_ID};
use crate::error::SimError;
use crate::exporter::{print_stats, write_params};
use crate::generator::CONTRACT_CODE_PARAM;
use crate::genesis::check_inputs;
use crate::runner::{check_app_name, setup};
use chainsim_env::{AppFactory, AppOptions, AppParams, OperationGenerator, Seed, SimApplication, StateCommitment};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info};

/// Contract code written into the campaign's params file.
pub const REFLECT_CONTRACT_CODE: &[u8] = b"\0asm\x01\0\0\0reflect-contract";

/// Result of every repetition of one seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub seed: Seed,
    /// Commitment all repetitions agreed on
    pub commitment: String,
    pub height: u64,
    pub runs: usize,
}

/// Result of a completed campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CampaignReport {
    pub seeds: Vec<SeedReport>,
}

impl CampaignReport {
    pub fn total_runs(&self) -> usize {
        self.seeds.iter().map(|s| s.runs).sum()
    }
}

/// The configuration a campaign actually runs with.
///
/// Invariant checks are off, the export params path is cleared, the chain
/// starts at height 1 with the simulation chain id, and `params_file` points
/// at the campaign's own params document.
pub fn campaign_config(config: &SimulationConfig, params_file: &std::path::Path) -> SimulationConfig {
    let mut campaign = config.clone();
    campaign.params_file = Some(params_file.to_path_buf());
    campaign.export_params_path = None;
    campaign.initial_height = 1;
    campaign.chain_id = SIMULATION_CHAIN_ID.to_string();
    campaign.all_invariants = false;
    campaign.on_operation = false;
    campaign.invariant_period = 0;
    campaign
}

/// Runs `campaign.num_seeds` seeds, each `campaign.runs_per_seed` times.
///
/// `make_generator` receives the campaign configuration once; the generator
/// it returns is reused for every run and must derive all randomness from
/// the run seed. Seeds are drawn from `config.seed`, so a campaign is
/// reproducible.
pub fn run_determinism_campaign<F, G, M>(
    factory: &F,
    make_generator: M,
    config: &SimulationConfig,
    campaign: &CampaignConfig,
) -> Result<CampaignReport, SimError>
where
    F: AppFactory,
    G: OperationGenerator<F::App>,
    M: FnOnce(&SimulationConfig) -> Result<G, SimError>,
{
    if campaign.num_seeds == 0 || campaign.runs_per_seed == 0 {
        return Err(SimError::config("campaign needs at least one seed and one run per seed"));
    }

    let params_dir = tempfile::Builder::new().prefix("chainsim-params-").tempdir()?;
    let params_path = params_dir.path().join("app-params.json");
    let mut params = AppParams::new();
    params.insert(CONTRACT_CODE_PARAM, &hex::encode(REFLECT_CONTRACT_CODE))?;
    write_params(&params_path, &params)?;

    let config = campaign_config(config, &params_path);
    check_inputs(&config)?;
    let mut generator = make_generator(&config)?;

    let mut seed_rng = ChaCha8Rng::seed_from_u64(config.seed as u64);
    let mut report = CampaignReport::default();

    for seed_index in 0..campaign.num_seeds {
        let seed: Seed = seed_rng.gen_range(0..=Seed::MAX);
        let run = config.run_params(seed);
        let mut expected: Option<StateCommitment> = None;
        let mut height = 0;

        for repetition in 0..campaign.runs_per_seed {
            info!(
                "running non-determinism simulation; seed {}: {}/{}, attempt: {}/{}",
                seed,
                seed_index + 1,
                campaign.num_seeds,
                repetition + 1,
                campaign.runs_per_seed
            );

            let mut instance = setup(factory, &config, &AppOptions::default(), false)?;
            check_app_name(&instance.app, factory.app_name())?;

            let outcome = generator.simulate_from_seed(&mut instance.app, &run);
            if config.commit {
                print_stats(&outcome);
            }
            if let Some(failure) = outcome.failure {
                return Err(SimError::simulation(format!(
                    "seed {} attempt {}/{}: {}",
                    seed,
                    repetition + 1,
                    campaign.runs_per_seed,
                    failure
                )));
            }

            let commit = instance.app.last_commit_id();
            debug!(seed, repetition, height = commit.version, commitment = %commit.hash, "repetition committed");

            match expected {
                None => {
                    expected = Some(commit.hash);
                    height = commit.version;
                }
                Some(first) if first != commit.hash => {
                    return Err(SimError::NonDeterminism {
                        seed,
                        seed_index,
                        num_seeds: campaign.num_seeds,
                        repetition,
                        runs: campaign.runs_per_seed,
                        expected: first,
                        actual: commit.hash,
                    });
                }
                Some(_) => {}
            }
        }

        if let Some(commitment) = expected {
            report.seeds.push(SeedReport {
                seed,
                commitment: commitment.to_hex(),
                height,
                runs: campaign.runs_per_seed,
            });
        }
    }

    info!(
        seeds = report.seeds.len(),
        runs = report.total_runs(),
        "determinism campaign passed"
    );
    Ok(report)
}
