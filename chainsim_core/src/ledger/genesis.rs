//! Genesis document: export, import and random generation.

use super::keys;
use super::types::{
    Account, Balance, Coins, CodeInfo, ContractInfo, ContractModel, Delegation,
    DistributionParams, FeePool, GovParams, MintParams, Minter, Proposal,
    Redelegation, StakingParams, TaxParams, UnbondingDelegation, UnbondingType, Validator, Vote,
    BPS,
};
use super::{AppError, LedgerApp};
use chainsim_env::{AppParams, EnvError, SimAccount};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub type GenesisAccount = Account;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGenesis {
    pub accounts: Vec<GenesisAccount>,
    pub next_account_number: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankGenesis {
    pub balances: Vec<Balance>,
    pub supply: Coins,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingGenesis {
    pub params: StakingParams,
    pub last_total_power: i64,
    pub last_validator_powers: Vec<(String, i64)>,
    pub validators: Vec<Validator>,
    pub delegations: Vec<Delegation>,
    pub unbonding_delegations: Vec<UnbondingDelegation>,
    pub redelegations: Vec<Redelegation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionGenesis {
    pub params: DistributionParams,
    pub fee_pool: FeePool,
    pub previous_proposer: Option<String>,
    pub outstanding_rewards: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintGenesis {
    pub minter: Minter,
    pub params: MintParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovGenesis {
    pub params: GovParams,
    pub next_proposal_id: u64,
    pub proposals: Vec<Proposal>,
    pub votes: Vec<Vote>,
}

impl Default for GovGenesis {
    fn default() -> Self {
        Self {
            params: GovParams::default(),
            next_proposal_id: 1,
            proposals: Vec::new(),
            votes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxGenesis {
    pub params: TaxParams,
    pub total_collected: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmContractGenesis {
    pub info: ContractInfo,
    pub state: Vec<ContractModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmGenesis {
    pub codes: Vec<CodeInfo>,
    pub contracts: Vec<WasmContractGenesis>,
    pub last_code_id: u64,
    pub last_contract_id: u64,
}

/// Full application state, one section per module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    pub auth: AuthGenesis,
    pub bank: BankGenesis,
    pub staking: StakingGenesis,
    pub distribution: DistributionGenesis,
    pub mint: MintGenesis,
    pub gov: GovGenesis,
    pub tax: TaxGenesis,
    pub wasm: WasmGenesis,
}

impl GenesisState {
    /// Sum of all balances per denom.
    pub fn computed_supply(&self) -> Coins {
        let mut supply = Coins::new();
        for balance in &self.bank.balances {
            for (denom, amount) in &balance.coins {
                *supply.entry(denom.clone()).or_insert(0) += amount;
            }
        }
        supply.retain(|_, amount| *amount > 0);
        supply
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, EnvError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ============================================================================
// EXPORT / IMPORT
// ============================================================================

impl LedgerApp {
    /// Reads every module's state into a genesis document.
    pub fn export_genesis(&self) -> Result<GenesisState, AppError> {
        let contracts = self
            .contracts()?
            .into_iter()
            .map(|info| {
                let state = self
                    .contract_state(&info.address)?
                    .into_iter()
                    .map(|(key, value)| ContractModel {
                        key: hex::encode(key),
                        value: hex::encode(value),
                    })
                    .collect();
                Ok(WasmContractGenesis { info, state })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(GenesisState {
            auth: AuthGenesis {
                accounts: self.accounts()?,
                next_account_number: self.next_account_number()?,
            },
            bank: BankGenesis {
                balances: self.all_balances()?,
                supply: self.total_supply()?,
            },
            staking: StakingGenesis {
                params: self.staking_params()?,
                last_total_power: self.last_total_power()?,
                last_validator_powers: self.last_validator_powers()?,
                validators: self.validators()?,
                delegations: self.all_delegations()?,
                unbonding_delegations: self.unbonding_delegations()?,
                redelegations: self.redelegations()?,
            },
            distribution: DistributionGenesis {
                params: self.distribution_params()?,
                fee_pool: self.fee_pool()?,
                previous_proposer: self.previous_proposer()?,
                outstanding_rewards: self.outstanding_rewards()?,
            },
            mint: MintGenesis {
                minter: self.minter()?,
                params: self.mint_params()?,
            },
            gov: GovGenesis {
                params: self.gov_params()?,
                next_proposal_id: self.next_proposal_id()?,
                proposals: self.proposals()?,
                votes: self.all_votes()?,
            },
            tax: TaxGenesis {
                params: self.tax_params()?,
                total_collected: self.tax_collected()?,
            },
            wasm: WasmGenesis {
                codes: self.codes()?,
                contracts,
                last_code_id: self.sequence(keys::wasm::LAST_CODE_ID)?,
                last_contract_id: self.sequence(keys::wasm::LAST_CONTRACT_ID)?,
            },
        })
    }

    /// Writes a genesis document into the working state.
    ///
    /// Time queues and unbonding-id bookkeeping are rebuilt from the
    /// exported records.
    pub fn init_genesis(&mut self, genesis: &GenesisState) -> Result<(), AppError> {
        // auth
        for account in &genesis.auth.accounts {
            self.set_account(account)?;
        }
        self.write(
            keys::ACC,
            keys::acc::NEXT_ACCOUNT_NUMBER.to_vec(),
            &genesis.auth.next_account_number,
        )?;

        // bank
        for balance in &genesis.bank.balances {
            for (denom, amount) in &balance.coins {
                self.set_balance(&balance.address, denom, *amount)?;
            }
        }
        let supply = if genesis.bank.supply.is_empty() {
            genesis.computed_supply()
        } else {
            genesis.bank.supply.clone()
        };
        for (denom, amount) in &supply {
            self.set_supply(denom, *amount)?;
        }

        self.init_staking_genesis(&genesis.staking)?;

        // distribution
        let dist = &genesis.distribution;
        self.write(keys::DISTRIBUTION, keys::distribution::PARAMS.to_vec(), &dist.params)?;
        self.write(keys::DISTRIBUTION, keys::distribution::FEE_POOL.to_vec(), &dist.fee_pool)?;
        if let Some(proposer) = &dist.previous_proposer {
            self.write(keys::DISTRIBUTION, keys::distribution::PREVIOUS_PROPOSER.to_vec(), proposer)?;
        }
        for (validator, amount) in &dist.outstanding_rewards {
            self.write(keys::DISTRIBUTION, keys::outstanding_rewards_key(validator), amount)?;
        }

        // mint
        self.write(keys::MINT, keys::mint::MINTER.to_vec(), &genesis.mint.minter)?;
        self.write(keys::MINT, keys::mint::PARAMS.to_vec(), &genesis.mint.params)?;

        // gov
        let gov = &genesis.gov;
        self.write(keys::GOV, keys::gov::PARAMS.to_vec(), &gov.params)?;
        self.write(keys::GOV, keys::gov::NEXT_PROPOSAL_ID.to_vec(), &gov.next_proposal_id)?;
        for proposal in &gov.proposals {
            self.set_proposal(proposal)?;
        }
        for vote in &gov.votes {
            self.set_vote(vote)?;
        }

        // tax
        self.write(keys::TAX, keys::tax::PARAMS.to_vec(), &genesis.tax.params)?;
        for (denom, amount) in &genesis.tax.total_collected {
            self.write(keys::TAX, keys::tax_collected_key(denom), amount)?;
        }

        self.init_wasm_genesis(&genesis.wasm)
    }

    fn init_staking_genesis(&mut self, staking: &StakingGenesis) -> Result<(), AppError> {
        use keys::staking as s;

        self.write(keys::STAKING, s::PARAMS.to_vec(), &staking.params)?;
        self.write(keys::STAKING, s::LAST_TOTAL_POWER.to_vec(), &staking.last_total_power)?;
        for (operator, power) in &staking.last_validator_powers {
            self.write(keys::STAKING, keys::last_validator_power_key(operator), power)?;
        }
        for validator in &staking.validators {
            self.set_validator(validator)?;
        }
        for delegation in &staking.delegations {
            self.set_delegation(delegation)?;
        }

        let mut max_id = 0u64;
        for ubd in &staking.unbonding_delegations {
            self.set_unbonding_delegation(ubd)?;
            let record_key = keys::unbonding_delegation_key(&ubd.delegator, &ubd.validator);
            for entry in &ubd.entries {
                self.push_queue(
                    s::UNBONDING_QUEUE,
                    entry.completion_time,
                    vec![ubd.delegator.clone(), ubd.validator.clone()],
                )?;
                self.index_unbonding_id(entry.unbonding_id, UnbondingType::UnbondingDelegation, &record_key)?;
                max_id = max_id.max(entry.unbonding_id);
            }
        }
        for red in &staking.redelegations {
            self.set_redelegation(red)?;
            let record_key = keys::redelegation_key(&red.delegator, &red.validator_src, &red.validator_dst);
            for entry in &red.entries {
                self.push_queue(
                    s::REDELEGATION_QUEUE,
                    entry.completion_time,
                    vec![red.delegator.clone(), red.validator_src.clone(), red.validator_dst.clone()],
                )?;
                self.index_unbonding_id(entry.unbonding_id, UnbondingType::Redelegation, &record_key)?;
                max_id = max_id.max(entry.unbonding_id);
            }
        }
        if max_id > 0 {
            self.write(keys::STAKING, s::UNBONDING_ID.to_vec(), &max_id)?;
        }
        Ok(())
    }

    fn index_unbonding_id(&mut self, id: u64, kind: UnbondingType, record_key: &[u8]) -> Result<(), AppError> {
        self.store_mut()
            .set(keys::STAKING, keys::unbonding_index_key(id), record_key.to_vec())?;
        self.write(keys::STAKING, keys::unbonding_type_key(id), &kind)
    }

    fn init_wasm_genesis(&mut self, wasm: &WasmGenesis) -> Result<(), AppError> {
        for code in &wasm.codes {
            self.write(keys::WASM, keys::code_key(code.code_id), code)?;
        }
        for contract in &wasm.contracts {
            let address = &contract.info.address;
            self.write(keys::WASM, keys::contract_key(address), &contract.info)?;
            for model in &contract.state {
                let key = hex::decode(&model.key).map_err(|e| AppError::CodecError(e.to_string()))?;
                let value = hex::decode(&model.value).map_err(|e| AppError::CodecError(e.to_string()))?;
                self.store_mut()
                    .set(keys::WASM, keys::contract_store_key(address, &key), value)?;
            }
        }
        self.set_sequence(keys::wasm::LAST_CODE_ID, wasm.last_code_id)?;
        self.set_sequence(keys::wasm::LAST_CONTRACT_ID, wasm.last_contract_id)
    }
}

// ============================================================================
// RANDOM GENESIS
// ============================================================================

/// Builds a randomized genesis for `accounts`.
///
/// Every random choice goes through `params`, so values present in a loaded
/// simulation-parameters document override the generated ones and the full
/// set can be exported afterwards.
pub fn random_genesis_state<R: Rng + ?Sized>(
    rng: &mut R,
    accounts: &[SimAccount],
    params: &mut AppParams,
    genesis_time: i64,
) -> Result<GenesisState, EnvError> {
    if accounts.is_empty() {
        return Err(EnvError::simulation("random genesis needs at least one account"));
    }
    let bond_denom = "stake".to_string();
    let initial_stake: u64 = params.get_or_generate("initial_stake", rng, |r| r.gen_range(10_000_000..=1_000_000_000))?;
    let max_bonded = accounts.len().min(10);
    let num_bonded: usize = params.get_or_generate("num_bonded_validators", rng, |r| r.gen_range(1..=max_bonded))?;
    let num_bonded = num_bonded.clamp(1, accounts.len());

    let staking_params = StakingParams {
        unbonding_time: params.get_or_generate("unbonding_time", rng, |r| r.gen_range(60..=600))?,
        max_validators: params.get_or_generate("max_validators", rng, |r| r.gen_range(1..=10))?,
        max_entries: 7,
        historical_entries: params.get_or_generate("historical_entries", rng, |r| r.gen_range(0..=20))?,
        bond_denom: bond_denom.clone(),
    };
    let minter = Minter {
        annual_inflation_bps: params.get_or_generate("annual_inflation_bps", rng, |r| r.gen_range(0..=2_000))?,
        prev_block_timestamp: 0,
        ..Minter::default()
    };
    let mint_params = MintParams {
        mint_denom: bond_denom.clone(),
        max_mintable_nanoseconds: params.get_or_generate("max_mintable_nanoseconds", rng, |r| {
            r.gen_range(1..=120u64) * 1_000_000_000
        })?,
    };
    let distribution_params = DistributionParams {
        community_tax_bps: params.get_or_generate("community_tax_bps", rng, |r| r.gen_range(0..=BPS / 10))?,
    };
    let gov_params = GovParams {
        min_deposit: params.get_or_generate("min_deposit", rng, |r| r.gen_range(1_000..=1_000_000))?,
        voting_period: params.get_or_generate("voting_period", rng, |r| r.gen_range(30..=300))?,
        deposit_denom: bond_denom.clone(),
    };
    let tax_params = TaxParams {
        tax_rate_bps: params.get_or_generate("tax_rate_bps", rng, |r| r.gen_range(0..=100))?,
        tax_cap: params.get_or_generate("tax_cap", rng, |r| r.gen_range(1_000..=10_000_000))?,
    };

    let mut genesis = GenesisState::default();
    let mut bonded_total = 0u64;
    for (i, account) in accounts.iter().enumerate() {
        genesis.auth.accounts.push(Account {
            address: account.address.clone(),
            pub_key: hex::encode(account.public_key),
            account_number: i as u64,
            sequence: 0,
        });
        let mut coins = Coins::new();
        coins.insert(bond_denom.clone(), initial_stake);
        coins.insert("ucoin".to_string(), rng.gen_range(1..=initial_stake));
        genesis.bank.balances.push(Balance {
            address: account.address.clone(),
            coins,
        });

        if i < num_bonded {
            let tokens = rng.gen_range(1_000_000..=initial_stake.max(1_000_000));
            bonded_total += tokens;
            genesis.staking.validators.push(Validator {
                operator: account.address.clone(),
                tokens,
                commission_bps: rng.gen_range(0..=2_000),
                moniker: format!("validator-{}", i),
            });
            genesis.staking.delegations.push(Delegation {
                delegator: account.address.clone(),
                validator: account.address.clone(),
                shares: tokens,
            });
        }
    }
    genesis.auth.next_account_number = accounts.len() as u64;

    let mut pool = Coins::new();
    pool.insert(bond_denom, bonded_total);
    genesis.bank.balances.push(Balance {
        address: keys::BONDED_POOL.to_string(),
        coins: pool,
    });
    genesis.bank.supply = genesis.computed_supply();

    genesis.staking.params = staking_params;
    genesis.distribution.params = distribution_params;
    genesis.mint = MintGenesis {
        minter,
        params: mint_params,
    };
    genesis.gov.params = gov_params;
    genesis.tax.params = tax_params;

    params.insert("genesis_time", &genesis_time)?;
    Ok(genesis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn accounts(n: usize) -> Vec<SimAccount> {
        (0..n)
            .map(|i| SimAccount {
                address: format!("chainsim1acct{}", i),
                public_key: [i as u8; 32],
            })
            .collect()
    }

    #[test]
    fn test_random_genesis_is_seed_deterministic() {
        let build = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut params = AppParams::new();
            random_genesis_state(&mut rng, &accounts(5), &mut params, 1_000).unwrap()
        };
        assert_eq!(build(7), build(7));
        assert_ne!(build(7), build(8));
    }

    #[test]
    fn test_params_override_generated_values() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut params = AppParams::new();
        params.insert("initial_stake", &42_000_000u64).unwrap();
        params.insert("num_bonded_validators", &2usize).unwrap();

        let genesis = random_genesis_state(&mut rng, &accounts(4), &mut params, 0).unwrap();
        assert_eq!(genesis.staking.validators.len(), 2);
        assert!(genesis
            .bank
            .balances
            .iter()
            .filter(|b| b.address.starts_with("chainsim1"))
            .all(|b| b.coins["stake"] == 42_000_000));
        assert!(params.contains("unbonding_time"));
    }

    #[test]
    fn test_random_genesis_satisfies_invariants() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut params = AppParams::new();
        let genesis = random_genesis_state(&mut rng, &accounts(6), &mut params, 0).unwrap();

        let mut app = LedgerApp::in_memory().unwrap();
        app.init_chain(&genesis, &chainsim_env::ConsensusParams::default(), 1)
            .unwrap();
        app.check_invariants().unwrap();
        assert_eq!(app.export_genesis().unwrap().bank.supply, genesis.bank.supply);
    }

    #[test]
    fn test_empty_account_list_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(random_genesis_state(&mut rng, &[], &mut AppParams::new(), 0).is_err());
    }
}
