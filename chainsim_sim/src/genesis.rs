//! Genesis and simulation-parameter provisioning.
//!
//! A run starts either from a user-supplied genesis document or from a
//! randomized one generated from the run's seed. A simulation-parameters
//! document pins values the randomized genesis would otherwise draw, so the
//! two inputs are mutually exclusive.

use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::keys::DeterministicKeyProvider;
use chainsim_core::ledger::{keys, random_genesis_state, GenesisState};
use chainsim_env::{AppParams, BlockParams, ConsensusParams, EvidenceParams, SimAccount, ValidatorParams};
use rand::Rng;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Everything a run needs before its first block.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub genesis: GenesisState,
    /// Accounts operations may be signed by
    pub accounts: Vec<SimAccount>,
    /// Loaded parameters plus every value generated for this run
    pub params: AppParams,
    pub consensus: ConsensusParams,
    /// Unix seconds
    pub genesis_time: i64,
}

/// Supplies genesis state and simulation parameters to runs.
#[derive(Debug, Clone)]
pub struct Provisioner {
    genesis: Option<GenesisState>,
    params: AppParams,
    genesis_time: i64,
}

impl Provisioner {
    /// Loads the configured documents.
    ///
    /// Fails with a configuration error when both a genesis file and a
    /// params file are configured. The genesis time is fixed here, so every
    /// run provisioned by this value shares it.
    pub fn new(config: &SimulationConfig) -> Result<Self, SimError> {
        check_inputs(config)?;

        let genesis = match &config.genesis_file {
            Some(path) => Some(load_genesis(path)?),
            None => None,
        };
        let params = match &config.params_file {
            Some(path) => load_params(path)?,
            None => AppParams::new(),
        };
        let genesis_time = config.genesis_time.unwrap_or_else(wall_clock_secs);

        Ok(Self::from_parts(genesis, params, genesis_time))
    }

    pub fn from_parts(genesis: Option<GenesisState>, params: AppParams, genesis_time: i64) -> Self {
        Self {
            genesis,
            params,
            genesis_time,
        }
    }

    pub fn genesis_time(&self) -> i64 {
        self.genesis_time
    }

    pub fn params(&self) -> &AppParams {
        &self.params
    }

    pub fn has_genesis(&self) -> bool {
        self.genesis.is_some()
    }

    /// Produces the genesis, accounts and parameters of one run.
    ///
    /// All randomness is drawn from `rng`, so equal seeds give equal results.
    pub fn provision<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Provisioned, SimError> {
        let mut params = self.params.clone();

        let (genesis, accounts, consensus) = match &self.genesis {
            Some(genesis) => {
                let accounts = genesis_accounts(genesis);
                params.insert("genesis_time", &self.genesis_time)?;
                let consensus = random_consensus_params(rng, &mut params)?;
                (genesis.clone(), accounts, consensus)
            }
            None => {
                let num_accounts: usize = params.get_or_generate("num_accounts", rng, |r| r.gen_range(4..=12))?;
                let key_seed: u64 = rng.gen();
                let accounts = DeterministicKeyProvider::new(key_seed).accounts(num_accounts.max(1));
                let genesis = random_genesis_state(rng, &accounts, &mut params, self.genesis_time)?;
                let consensus = random_consensus_params(rng, &mut params)?;
                (genesis, accounts, consensus)
            }
        };

        if accounts.is_empty() {
            return Err(SimError::config("genesis contains no user accounts"));
        }
        debug!(
            accounts = accounts.len(),
            params = params.len(),
            genesis_time = self.genesis_time,
            "provisioned genesis"
        );

        Ok(Provisioned {
            genesis,
            accounts,
            params,
            consensus,
            genesis_time: self.genesis_time,
        })
    }
}

/// Rejects a configuration naming both a genesis file and a params file.
pub fn check_inputs(config: &SimulationConfig) -> Result<(), SimError> {
    if let (Some(genesis), Some(params)) = (&config.genesis_file, &config.params_file) {
        return Err(SimError::config(format!(
            "cannot provide both a genesis file ({}) and a params file ({})",
            genesis.display(),
            params.display()
        )));
    }
    Ok(())
}

fn load_genesis(path: &Path) -> Result<GenesisState, SimError> {
    let bytes = fs::read(path)
        .map_err(|e| SimError::config(format!("cannot read genesis file {}: {}", path.display(), e)))?;
    let genesis = GenesisState::from_json(&bytes)?;
    info!(path = %path.display(), accounts = genesis.auth.accounts.len(), "loaded genesis file");
    Ok(genesis)
}

fn load_params(path: &Path) -> Result<AppParams, SimError> {
    let bytes = fs::read(path)
        .map_err(|e| SimError::config(format!("cannot read params file {}: {}", path.display(), e)))?;
    let params = AppParams::from_json(&bytes)?;
    info!(path = %path.display(), params = params.len(), "loaded simulation params");
    Ok(params)
}

/// User accounts of a genesis document; module accounts are skipped.
fn genesis_accounts(genesis: &GenesisState) -> Vec<SimAccount> {
    genesis
        .auth
        .accounts
        .iter()
        .filter(|a| !keys::MODULE_ACCOUNTS.contains(&a.address.as_str()))
        .map(|a| {
            let public_key = hex::decode(&a.pub_key)
                .ok()
                .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
                .unwrap_or([0u8; 32]);
            SimAccount {
                address: a.address.clone(),
                public_key,
            }
        })
        .collect()
}

fn random_consensus_params<R: Rng + ?Sized>(rng: &mut R, params: &mut AppParams) -> Result<ConsensusParams, SimError> {
    Ok(ConsensusParams {
        block: BlockParams {
            max_bytes: params.get_or_generate("block_max_bytes", rng, |r| r.gen_range(20_000..=30_000_000))?,
            max_gas: params.get_or_generate("block_max_gas", rng, |r| r.gen_range(-1..=50_000_000))?,
        },
        evidence: EvidenceParams {
            max_age_num_blocks: params.get_or_generate("evidence_max_age_blocks", rng, |r| r.gen_range(100..=1_000_000))?,
            max_age_duration_secs: params.get_or_generate("evidence_max_age_secs", rng, |r| r.gen_range(3_600..=1_814_400))?,
            max_bytes: 10_000,
        },
        validator: ValidatorParams {
            pub_key_types: vec!["ed25519".to_string()],
        },
    })
}

fn wall_clock_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
