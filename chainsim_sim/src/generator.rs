//! Seeded random operation generator for the ledger application.
//!
//! One call to [`OperationGenerator::simulate_from_seed`] provisions a
//! genesis, initializes the chain and runs `num_blocks` blocks. Every random
//! choice is drawn from a single `ChaCha8Rng` seeded with the run seed, so the
//! sequence of blocks, and therefore the final commit, is a pure function of
//! the seed and the provisioner's inputs.

use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::genesis::{Provisioned, Provisioner};
use chainsim_core::ledger::types::VoteOption;
use chainsim_core::ledger::{LedgerApp, Operation};
use chainsim_env::{
    AppParams, BlockHeader, OperationGenerator, RunParams, SimAccount,
    SimApplication, SimulationOutcome,
};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Poisson;
use tracing::{debug, info, warn};

/// Parameter holding the hex-encoded contract code used by store-code operations.
pub const CONTRACT_CODE_PARAM: &str = "reflect_contract_code";

/// Longest gap between two blocks, seconds.
const MAX_BLOCK_INTERVAL_SECS: i64 = 10;

const DENOMS: &[&str] = &["stake", "ucoin"];

// ============================================================================
// OPERATION WEIGHTS
// ============================================================================

/// Relative frequency of every operation route.
struct OperationWeights {
    routes: Vec<&'static str>,
    /// None when every weight is zero
    index: Option<WeightedIndex<u32>>,
}

impl OperationWeights {
    /// Reads `op_weight_<route>` entries from `params`, generating missing ones.
    fn from_params<R: Rng + ?Sized>(params: &mut AppParams, rng: &mut R) -> Result<Self, SimError> {
        let routes: Vec<&'static str> = Operation::ROUTES.to_vec();
        let mut weights = Vec::with_capacity(routes.len());
        for route in &routes {
            let key = format!("op_weight_{}", route.replace('/', "_"));
            let weight: u32 = params.get_or_generate(&key, rng, |r| r.gen_range(0..=100))?;
            weights.push(weight);
        }
        let index = WeightedIndex::new(&weights).ok();
        Ok(Self { routes, index })
    }

    fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&'static str> {
        self.index.as_ref().map(|index| self.routes[index.sample(rng)])
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Drives a [`LedgerApp`] through randomized blocks.
pub struct RandomOperationGenerator {
    provisioner: Provisioner,
}

impl RandomOperationGenerator {
    pub fn new(provisioner: Provisioner) -> Self {
        Self { provisioner }
    }

    pub fn from_config(config: &SimulationConfig) -> Result<Self, SimError> {
        Ok(Self::new(Provisioner::new(config)?))
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    fn run(&self, app: &mut LedgerApp, run: &RunParams, outcome: &mut SimulationOutcome) -> Result<(), SimError> {
        let mut rng = ChaCha8Rng::seed_from_u64(run.seed as u64);

        let Provisioned {
            genesis,
            accounts,
            mut params,
            consensus,
            genesis_time,
        } = self.provisioner.provision(&mut rng)?;
        app.init_chain(&genesis, &consensus, run.initial_height)?;

        let weights = OperationWeights::from_params(&mut params, &mut rng)?;
        let code_hex: String = params.get_or_generate(CONTRACT_CODE_PARAM, &mut rng, |r| {
            let code: Vec<u8> = (0..64).map(|_| r.gen()).collect();
            hex::encode(code)
        })?;
        let contract_code = hex::decode(&code_hex)
            .map_err(|e| SimError::config(format!("invalid {}: {}", CONTRACT_CODE_PARAM, e)))?;
        outcome.params = params;

        let ops_per_block = match run.block_size {
            0 => None,
            size => Some(
                Poisson::new(f64::from(size)).map_err(|e| SimError::config(format!("invalid block size: {}", e)))?,
            ),
        };

        let mut time = genesis_time;
        for _ in 0..run.num_blocks {
            let height = app.next_height();
            time += rng.gen_range(1..=MAX_BLOCK_INTERVAL_SECS);
            let proposer = app
                .validators()?
                .choose(&mut rng)
                .map(|v| v.operator.clone())
                .unwrap_or_else(|| accounts[0].address.clone());

            app.begin_block(BlockHeader {
                chain_id: run.chain_id.clone(),
                height,
                time,
                proposer,
            })?;

            let num_ops = match &ops_per_block {
                Some(dist) => {
                    let drawn: f64 = dist.sample(&mut rng);
                    drawn as u64
                }
                None => 0,
            };
            for _ in 0..num_ops {
                let Some(route) = weights.choose(&mut rng) else {
                    break;
                };
                let ok = match random_operation(&mut rng, app, route, &accounts, &contract_code)? {
                    Some(op) => {
                        let result = app.deliver(&op);
                        if !run.lean {
                            match &result {
                                Ok(()) => debug!(height, route, "operation applied"),
                                Err(e) => debug!(height, route, error = %e, "operation failed"),
                            }
                        }
                        result.is_ok()
                    }
                    None => false,
                };
                outcome.stats.record(route, ok);

                if run.on_operation {
                    app.check_invariants().map_err(|e| {
                        SimError::simulation(format!("invariant broken at height {} after {}: {}", height, route, e))
                    })?;
                }
            }

            app.end_block()?;
            app.commit()?;
            outcome.blocks += 1;

            let periodic = run.invariant_period > 0 && outcome.blocks % run.invariant_period == 0;
            if run.all_invariants || periodic {
                app.check_invariants()
                    .map_err(|e| SimError::simulation(format!("invariant broken at height {}: {}", height, e)))?;
            }
        }

        Ok(())
    }
}

impl OperationGenerator<LedgerApp> for RandomOperationGenerator {
    fn simulate_from_seed(&mut self, app: &mut LedgerApp, run: &RunParams) -> SimulationOutcome {
        let mut outcome = SimulationOutcome::default();
        if let Err(e) = self.run(app, run, &mut outcome) {
            warn!(seed = run.seed, blocks = outcome.blocks, error = %e, "simulation stopped early");
            outcome.failure = Some(e.to_string());
        }
        outcome.final_commit = app.last_commit_id();
        outcome.store_stats = app.store_stats();
        info!(
            seed = run.seed,
            blocks = outcome.blocks,
            operations = outcome.stats.total(),
            height = outcome.final_commit.version,
            "simulation finished"
        );
        outcome
    }
}

// ============================================================================
// RANDOM OPERATIONS
// ============================================================================

fn pick<'a, R: Rng + ?Sized, T>(rng: &mut R, items: &'a [T]) -> Option<&'a T> {
    items.choose(rng)
}

/// Builds a random operation for `route` against the current state.
///
/// Returns `None` when the state offers no candidate (no balance, no
/// delegation, no contract, ...).
fn random_operation<R: Rng + ?Sized>(
    rng: &mut R,
    app: &LedgerApp,
    route: &str,
    accounts: &[SimAccount],
    contract_code: &[u8],
) -> Result<Option<Operation>, SimError> {
    let Some(account) = pick(rng, accounts) else {
        return Ok(None);
    };
    let signer = account.address.clone();

    let op = match route {
        "bank/send" => {
            let Some(to) = pick(rng, accounts) else {
                return Ok(None);
            };
            let denom = DENOMS[rng.gen_range(0..DENOMS.len())];
            let balance = app.balance(&signer, denom)?;
            if balance == 0 {
                return Ok(None);
            }
            Operation::Send {
                from: signer,
                to: to.address.clone(),
                denom: denom.to_string(),
                amount: rng.gen_range(1..=balance),
                fee: rng.gen_range(0..=1_000),
            }
        }
        "staking/delegate" => {
            let validators = app.validators()?;
            let Some(validator) = pick(rng, &validators) else {
                return Ok(None);
            };
            let balance = app.balance(&signer, &app.staking_params()?.bond_denom)?;
            if balance < 2 {
                return Ok(None);
            }
            Operation::Delegate {
                delegator: signer,
                validator: validator.operator.clone(),
                amount: rng.gen_range(1..=balance / 2),
            }
        }
        "staking/undelegate" => {
            let delegations = app.all_delegations()?;
            let Some(delegation) = pick(rng, &delegations) else {
                return Ok(None);
            };
            if delegation.shares == 0 {
                return Ok(None);
            }
            Operation::Undelegate {
                delegator: delegation.delegator.clone(),
                validator: delegation.validator.clone(),
                amount: rng.gen_range(1..=delegation.shares),
            }
        }
        "staking/redelegate" => {
            let delegations = app.all_delegations()?;
            let Some(delegation) = pick(rng, &delegations) else {
                return Ok(None);
            };
            let others: Vec<String> = app
                .validators()?
                .into_iter()
                .map(|v| v.operator)
                .filter(|operator| *operator != delegation.validator)
                .collect();
            let Some(dst) = pick(rng, &others) else {
                return Ok(None);
            };
            if delegation.shares == 0 {
                return Ok(None);
            }
            Operation::Redelegate {
                delegator: delegation.delegator.clone(),
                validator_src: delegation.validator.clone(),
                validator_dst: dst.clone(),
                amount: rng.gen_range(1..=delegation.shares),
            }
        }
        "gov/submit_proposal" => {
            let min_deposit = app.gov_params()?.min_deposit;
            Operation::SubmitProposal {
                proposer: signer,
                title: format!("proposal-{:08x}", rng.gen::<u32>()),
                deposit: rng.gen_range(min_deposit..=min_deposit.saturating_mul(2)),
            }
        }
        "gov/vote" => {
            let proposals = app.active_proposals()?;
            let Some(proposal) = pick(rng, &proposals) else {
                return Ok(None);
            };
            let option = match rng.gen_range(0..3) {
                0 => VoteOption::Yes,
                1 => VoteOption::No,
                _ => VoteOption::Abstain,
            };
            Operation::Vote {
                proposal_id: proposal.id,
                voter: signer,
                option,
            }
        }
        "wasm/store_code" => Operation::StoreCode {
            creator: signer,
            code: contract_code.to_vec(),
        },
        "wasm/instantiate" => {
            let codes = app.codes()?;
            let Some(code) = pick(rng, &codes) else {
                return Ok(None);
            };
            Operation::Instantiate {
                creator: signer,
                code_id: code.code_id,
                label: format!("contract-{:08x}", rng.gen::<u32>()),
                init_count: rng.gen_range(0..100),
            }
        }
        "wasm/execute" => {
            let contracts = app.contracts()?;
            let Some(contract) = pick(rng, &contracts) else {
                return Ok(None);
            };
            Operation::Execute {
                sender: signer,
                contract: contract.address.clone(),
                increment: rng.gen_range(1..=10),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsim_env::AppParams;

    fn generator() -> RandomOperationGenerator {
        RandomOperationGenerator::new(Provisioner::from_parts(None, AppParams::new(), 1_600_000_000))
    }

    fn short_run(seed: i64) -> RunParams {
        RunParams {
            seed,
            num_blocks: 12,
            block_size: 8,
            all_invariants: true,
            lean: true,
            ..RunParams::default()
        }
    }

    #[test]
    fn test_same_seed_same_commit() {
        let mut generator = generator();
        let run = short_run(42);

        let mut a = LedgerApp::in_memory().unwrap();
        let mut b = LedgerApp::in_memory().unwrap();
        let first = generator.simulate_from_seed(&mut a, &run);
        let second = generator.simulate_from_seed(&mut b, &run);

        assert!(first.is_ok(), "{:?}", first.failure);
        assert_eq!(first.final_commit, second.final_commit);
        assert_eq!(first.stats, second.stats);
        assert_eq!(first.params, second.params);
        assert_eq!(first.blocks, 12);
        assert_eq!(first.final_commit.version, 12);
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut generator = generator();
        let mut a = LedgerApp::in_memory().unwrap();
        let mut b = LedgerApp::in_memory().unwrap();

        let first = generator.simulate_from_seed(&mut a, &short_run(1));
        let second = generator.simulate_from_seed(&mut b, &short_run(2));
        assert_ne!(first.final_commit.hash, second.final_commit.hash);
    }

    #[test]
    fn test_params_record_weights_and_code() {
        let mut generator = generator();
        let mut app = LedgerApp::in_memory().unwrap();
        let outcome = generator.simulate_from_seed(&mut app, &short_run(5));

        assert!(outcome.params.contains(CONTRACT_CODE_PARAM));
        assert!(outcome.params.contains("op_weight_bank_send"));
        assert!(outcome.params.contains("genesis_time"));
    }

    #[test]
    fn test_zero_weights_run_empty_blocks() {
        let mut params = AppParams::new();
        for route in Operation::ROUTES {
            params
                .insert(format!("op_weight_{}", route.replace('/', "_")), &0u32)
                .unwrap();
        }
        let mut generator = RandomOperationGenerator::new(Provisioner::from_parts(None, params, 0));
        let mut app = LedgerApp::in_memory().unwrap();

        let outcome = generator.simulate_from_seed(&mut app, &short_run(3));
        assert!(outcome.is_ok());
        assert_eq!(outcome.stats.total(), 0);
        assert_eq!(outcome.blocks, 12);
    }

    #[test]
    fn test_initial_height_respected() {
        let mut generator = generator();
        let mut app = LedgerApp::in_memory().unwrap();
        let run = RunParams {
            initial_height: 10,
            ..short_run(8)
        };

        let outcome = generator.simulate_from_seed(&mut app, &run);
        assert!(outcome.is_ok(), "{:?}", outcome.failure);
        assert_eq!(outcome.final_commit.version, 21);
    }
}
