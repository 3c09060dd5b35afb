//! Reference ledger application.
//!
//! A small multi-module chain (accounts, bank, staking, distribution, mint,
//! governance, tax, contracts) built on [`MultiStore`]. It exists so the
//! verification harness has a realistic state machine to drive: every module
//! owns one namespace, every record is JSON-encoded, and the whole state can
//! be exported and re-imported.
//!
//! # Block lifecycle
//!
//! ```text
//! init_chain ─▶ begin_block ─▶ deliver* ─▶ end_block ─▶ commit ─┐
//!                   ▲                                            │
//!                   └────────────────────────────────────────────┘
//! ```

mod bank;
mod decoders;
mod distribution;
mod genesis;
mod gov;
mod invariants;
pub mod keys;
mod ops;
mod staking;
pub mod types;
mod wasm;

pub use decoders::decoder_registry;
pub use genesis::{
    random_genesis_state, AuthGenesis, BankGenesis, DistributionGenesis, GenesisAccount,
    GenesisState, GovGenesis, MintGenesis, StakingGenesis, TaxGenesis, WasmContractGenesis,
    WasmGenesis,
};
pub use invariants::INVARIANT_ROUTES;
pub use ops::Operation;

use crate::diff::NamespaceComparison;
use crate::store::{CommitmentMode, MultiStore, SledBackend, StoreError};
use chainsim_env::{
    AppFactory, AppOptions, BlockHeader, BlockParams, CommitId, ConsensusParams, EnvError,
    EvidenceParams, ExportedApp, ExportedValidator, NamespaceSnapshot, SimApplication,
    StoreLocation, StoreStats, ValidatorParams,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Name reported by every ledger instance.
pub const APP_NAME: &str = "ledgerapp";

/// Errors raised while executing ledger state transitions.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    CodecError(String),

    #[error("Insufficient funds: {address} has {available}{denom}, needs {required}{denom}")]
    InsufficientFunds {
        address: String,
        denom: String,
        available: u64,
        required: u64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("No block in progress")]
    NoBlock,

    #[error("Invariant broken: {0}")]
    InvariantBroken(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::CodecError(err.to_string())
    }
}

impl From<AppError> for EnvError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Store(e) => e.into(),
            AppError::CodecError(msg) => EnvError::CodecError(msg),
            other => EnvError::simulation(other.to_string()),
        }
    }
}

// ============================================================================
// APPLICATION
// ============================================================================

/// The ledger application instance.
pub struct LedgerApp {
    name: String,

    store: MultiStore,

    /// Header of the block being executed, between `begin_block` and `commit`
    header: Option<BlockHeader>,

    /// Height the chain started at
    initial_height: u64,
}

impl LedgerApp {
    /// Opens an instance over `store` and stages default module parameters.
    pub fn new(store: MultiStore) -> Result<Self, AppError> {
        let mut app = Self {
            name: APP_NAME.to_string(),
            store,
            header: None,
            initial_height: 1,
        };
        app.write_default_params()?;
        Ok(app)
    }

    /// In-memory instance with the tree commitment.
    pub fn in_memory() -> Result<Self, AppError> {
        Self::new(MultiStore::in_memory(keys::NAMESPACES, CommitmentMode::Tree))
    }

    fn write_default_params(&mut self) -> Result<(), AppError> {
        self.write(keys::STAKING, keys::staking::PARAMS.to_vec(), &types::StakingParams::default())?;
        self.write(
            keys::DISTRIBUTION,
            keys::distribution::PARAMS.to_vec(),
            &types::DistributionParams::default(),
        )?;
        self.write(keys::MINT, keys::mint::PARAMS.to_vec(), &types::MintParams::default())?;
        self.write(keys::MINT, keys::mint::MINTER.to_vec(), &types::Minter::default())?;
        self.write(keys::GOV, keys::gov::PARAMS.to_vec(), &types::GovParams::default())?;
        self.write(keys::TAX, keys::tax::PARAMS.to_vec(), &types::TaxParams::default())?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Typed store access
    // ------------------------------------------------------------------------

    pub(crate) fn read<T: DeserializeOwned>(&self, namespace: &str, key: &[u8]) -> Result<Option<T>, AppError> {
        match self.store.get(namespace, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn write<T: Serialize>(&mut self, namespace: &str, key: Vec<u8>, value: &T) -> Result<(), AppError> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(namespace, key, bytes)?;
        Ok(())
    }

    pub(crate) fn remove(&mut self, namespace: &str, key: &[u8]) -> Result<(), AppError> {
        self.store.delete(namespace, key)?;
        Ok(())
    }

    pub(crate) fn scan<T: DeserializeOwned>(&self, namespace: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, T)>, AppError> {
        self.store
            .prefix_scan(namespace, prefix)?
            .into_iter()
            .map(|(key, bytes)| Ok((key, serde_json::from_slice(&bytes)?)))
            .collect()
    }

    pub(crate) fn store_mut(&mut self) -> &mut MultiStore {
        &mut self.store
    }

    /// Read-only copy of this instance holding only committed state.
    fn committed_view(&self) -> Result<LedgerApp, AppError> {
        Ok(Self {
            name: self.name.clone(),
            store: self.store.committed_copy()?,
            header: None,
            initial_height: self.initial_height,
        })
    }

    pub(crate) fn header(&self) -> Result<&BlockHeader, AppError> {
        self.header.as_ref().ok_or(AppError::NoBlock)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Stages the genesis state and consensus parameters. The first block's
    /// commit makes them visible.
    pub fn init_chain(
        &mut self,
        genesis: &GenesisState,
        consensus: &ConsensusParams,
        initial_height: u64,
    ) -> Result<(), AppError> {
        self.init_genesis(genesis)?;
        self.store_consensus_params(consensus)?;
        self.initial_height = initial_height;
        debug!(
            accounts = genesis.auth.accounts.len(),
            validators = genesis.staking.validators.len(),
            initial_height,
            "chain initialized"
        );
        Ok(())
    }

    /// Height the next block must carry.
    pub fn next_height(&self) -> u64 {
        match self.store.last_commit().version {
            0 => self.initial_height,
            h => h + 1,
        }
    }

    pub fn begin_block(&mut self, header: BlockHeader) -> Result<(), AppError> {
        if header.height != self.next_height() {
            return Err(AppError::invalid(format!(
                "block height {} does not follow {}",
                header.height,
                self.store.last_commit().version
            )));
        }
        self.header = Some(header);
        self.reset_tx_counter()?;
        self.mint_block_provision()?;
        self.allocate_fees()?;
        Ok(())
    }

    /// Executes one operation atomically: on failure none of its writes remain.
    pub fn deliver(&mut self, op: &Operation) -> Result<(), AppError> {
        self.header()?;
        self.store.begin_cache();
        match self.apply_operation(op) {
            Ok(()) => {
                self.store.write_cache()?;
                Ok(())
            }
            Err(e) => {
                self.store.discard_cache();
                Err(e)
            }
        }
    }

    pub fn end_block(&mut self) -> Result<Vec<types::ValidatorUpdate>, AppError> {
        let header = self.header()?.clone();
        self.complete_unbondings(header.time)?;
        self.complete_redelegations(header.time)?;
        self.tally_proposals(header.time)?;
        self.track_historical_info(header.height, header.time)?;
        self.apply_validator_updates()
    }

    pub fn commit(&mut self) -> Result<CommitId, AppError> {
        let header = self.header.take().ok_or(AppError::NoBlock)?;
        let commit = self.store.commit(header.height)?;
        Ok(commit)
    }

    // ------------------------------------------------------------------------
    // Consensus parameters
    // ------------------------------------------------------------------------

    pub fn store_consensus_params(&mut self, params: &ConsensusParams) -> Result<(), AppError> {
        self.write(keys::PARAMS, keys::BLOCK_PARAMS.as_bytes().to_vec(), &params.block)?;
        self.write(keys::PARAMS, keys::EVIDENCE_PARAMS.as_bytes().to_vec(), &params.evidence)?;
        self.write(keys::PARAMS, keys::VALIDATOR_PARAMS.as_bytes().to_vec(), &params.validator)?;
        Ok(())
    }

    pub fn consensus_params(&self) -> Result<ConsensusParams, AppError> {
        let block: Option<BlockParams> = self.read(keys::PARAMS, keys::BLOCK_PARAMS.as_bytes())?;
        let evidence: Option<EvidenceParams> = self.read(keys::PARAMS, keys::EVIDENCE_PARAMS.as_bytes())?;
        let validator: Option<ValidatorParams> = self.read(keys::PARAMS, keys::VALIDATOR_PARAMS.as_bytes())?;
        match (block, evidence, validator) {
            (Some(block), Some(evidence), Some(validator)) => Ok(ConsensusParams {
                block,
                evidence,
                validator,
            }),
            _ => Err(AppError::not_found("consensus params")),
        }
    }
}

impl SimApplication for LedgerApp {
    fn name(&self) -> &str {
        &self.name
    }

    fn last_block_height(&self) -> u64 {
        self.store.last_commit().version
    }

    fn last_commit_id(&self) -> CommitId {
        self.store.last_commit()
    }

    fn namespace_store(&self, namespace: &str) -> Result<NamespaceSnapshot, EnvError> {
        Ok(self.store.snapshot(namespace)?)
    }

    /// Exports the last committed state. Writes of a block left open by a
    /// failed run are not part of it.
    fn export_state(&self) -> Result<ExportedApp, EnvError> {
        if self.store.has_uncommitted() {
            debug!(height = self.last_block_height(), "exporting from committed state; open block dropped");
            return self.committed_view()?.export_state();
        }

        let genesis = self.export_genesis().map_err(|e| EnvError::export(e.to_string()))?;
        let validators = genesis
            .staking
            .last_validator_powers
            .iter()
            .map(|(address, power)| ExportedValidator {
                address: address.clone(),
                power: *power,
            })
            .collect();
        let consensus_params = self
            .consensus_params()
            .map_err(|e| EnvError::export(e.to_string()))?;
        Ok(ExportedApp {
            app_state: serde_json::to_vec_pretty(&genesis)?,
            validators,
            height: self.last_block_height(),
            consensus_params,
        })
    }

    fn init_from_export(&mut self, exported: &ExportedApp) -> Result<(), EnvError> {
        let genesis: GenesisState = serde_json::from_slice(&exported.app_state)
            .map_err(|e| EnvError::import(format!("failed to decode app state: {}", e)))?;
        self.init_genesis(&genesis)
            .map_err(|e| EnvError::import(e.to_string()))?;
        self.store_consensus_params(&exported.consensus_params)?;
        self.initial_height = exported.height;
        self.store.commit(exported.height)?;
        Ok(())
    }

    fn store_stats(&self) -> Option<StoreStats> {
        self.store.stats().ok()
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Opens ledger instances over memory or sled stores.
#[derive(Debug, Clone, Default)]
pub struct LedgerAppFactory;

impl AppFactory for LedgerAppFactory {
    type App = LedgerApp;

    fn app_name(&self) -> &str {
        APP_NAME
    }

    fn new_instance(&self, location: &StoreLocation, options: &AppOptions) -> Result<LedgerApp, EnvError> {
        let mode = if options.faux_merkle {
            CommitmentMode::Flat
        } else {
            CommitmentMode::Tree
        };
        let store = match location {
            StoreLocation::Memory => MultiStore::in_memory(keys::NAMESPACES, mode),
            StoreLocation::Disk(dir) => {
                let backend = SledBackend::open(dir.join("application.db"))?;
                MultiStore::new(Box::new(backend), keys::NAMESPACES, mode)
            }
        };
        Ok(LedgerApp::new(store)?)
    }
}

/// Namespaces compared after an export/import round trip, with the keys
/// each one is allowed to differ on.
///
/// Staking queues, unbonding bookkeeping, historical info and the last
/// validator updates are rebuilt or dropped on import. The bank's
/// denom→holder index is an aggregate. The contract transaction counter
/// only exists while blocks execute.
pub fn ledger_store_comparisons() -> Vec<NamespaceComparison> {
    use keys::staking as s;
    vec![
        NamespaceComparison::new(keys::ACC),
        NamespaceComparison::new(keys::STAKING)
            .with_excluded_prefix(vec![s::UNBONDING_QUEUE])
            .with_excluded_prefix(vec![s::REDELEGATION_QUEUE])
            .with_excluded_prefix(vec![s::VALIDATOR_QUEUE])
            .with_excluded_prefix(vec![s::HISTORICAL_INFO])
            .with_excluded_prefix(s::UNBONDING_ID.to_vec())
            .with_excluded_prefix(vec![s::UNBONDING_INDEX])
            .with_excluded_prefix(vec![s::UNBONDING_TYPE])
            .with_excluded_prefix(s::VALIDATOR_UPDATES.to_vec()),
        NamespaceComparison::new(keys::DISTRIBUTION),
        NamespaceComparison::new(keys::MINT),
        NamespaceComparison::new(keys::BANK)
            .with_excluded_prefix(vec![keys::bank::DENOM_ADDRESS_INDEX]),
        NamespaceComparison::new(keys::PARAMS),
        NamespaceComparison::new(keys::GOV),
        NamespaceComparison::new(keys::TAX),
        NamespaceComparison::new(keys::WASM).with_force_deleted_key(keys::wasm::TX_COUNTER.to_vec()),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub const ALICE: &str = "chainsim1alice";
    pub const BOB: &str = "chainsim1bob";
    pub const VAL1: &str = "chainsim1val1";
    pub const VAL2: &str = "chainsim1val2";

    /// Two funded users and two bonded validators.
    pub fn fixture_genesis() -> GenesisState {
        let mut genesis = GenesisState::default();
        for (i, address) in [ALICE, BOB, VAL1, VAL2].iter().enumerate() {
            genesis.auth.accounts.push(GenesisAccount {
                address: address.to_string(),
                pub_key: String::new(),
                account_number: i as u64,
                sequence: 0,
            });
            let mut coins = types::Coins::new();
            coins.insert("stake".to_string(), 100_000_000);
            coins.insert("ucoin".to_string(), 50_000_000);
            genesis.bank.balances.push(types::Balance {
                address: address.to_string(),
                coins,
            });
        }
        genesis.auth.next_account_number = 4;
        for validator in [VAL1, VAL2] {
            genesis.staking.validators.push(types::Validator {
                operator: validator.to_string(),
                tokens: 10_000_000,
                commission_bps: 500,
                moniker: validator.to_string(),
            });
            genesis.staking.delegations.push(types::Delegation {
                delegator: validator.to_string(),
                validator: validator.to_string(),
                shares: 10_000_000,
            });
        }
        let mut pool = types::Coins::new();
        pool.insert("stake".to_string(), 20_000_000);
        genesis.bank.balances.push(types::Balance {
            address: keys::BONDED_POOL.to_string(),
            coins: pool,
        });
        genesis.staking.params.unbonding_time = 20;
        genesis.gov.params.voting_period = 15;
        genesis.gov.params.min_deposit = 1_000;
        genesis.bank.supply = genesis.computed_supply();
        genesis
    }

    pub fn header(height: u64, time: i64) -> BlockHeader {
        BlockHeader {
            chain_id: "test-chain".to_string(),
            height,
            time,
            proposer: VAL1.to_string(),
        }
    }

    /// Instance initialized with [`fixture_genesis`] and the first block committed.
    pub fn started_app() -> LedgerApp {
        let mut app = LedgerApp::in_memory().unwrap();
        app.init_chain(&fixture_genesis(), &ConsensusParams::default(), 1)
            .unwrap();
        run_block(&mut app, 1_000, &[]);
        app
    }

    /// Runs one block at `time` containing `ops`; every op must succeed.
    pub fn run_block(app: &mut LedgerApp, time: i64, ops: &[Operation]) -> CommitId {
        let height = app.next_height();
        app.begin_block(header(height, time)).unwrap();
        for op in ops {
            app.deliver(op).unwrap();
        }
        app.end_block().unwrap();
        app.check_invariants().unwrap();
        app.commit().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::report::render_diff;

    #[test]
    fn test_block_height_must_follow() {
        let mut app = started_app();
        assert!(matches!(
            app.begin_block(header(5, 2_000)),
            Err(AppError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_failed_operation_leaves_no_writes() {
        let mut app = started_app();
        app.begin_block(header(2, 1_010)).unwrap();
        let before = app.balance(ALICE, "stake").unwrap();

        let result = app.deliver(&Operation::Send {
            from: ALICE.to_string(),
            to: BOB.to_string(),
            denom: "stake".to_string(),
            amount: before * 2,
            fee: 10,
        });
        assert!(matches!(result, Err(AppError::InsufficientFunds { .. })));
        assert_eq!(app.balance(ALICE, "stake").unwrap(), before);
        assert_eq!(app.account(ALICE).unwrap().map(|a| a.sequence), Some(0));
    }

    #[test]
    fn test_same_blocks_same_commitment() {
        let ops = vec![
            Operation::Send {
                from: ALICE.to_string(),
                to: BOB.to_string(),
                denom: "ucoin".to_string(),
                amount: 1_000,
                fee: 5,
            },
            Operation::Delegate {
                delegator: BOB.to_string(),
                validator: VAL2.to_string(),
                amount: 2_000_000,
            },
        ];
        let run = || {
            let mut app = started_app();
            run_block(&mut app, 1_006, &ops);
            run_block(&mut app, 1_012, &[]).hash
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_export_import_round_trip_has_no_divergence() {
        let mut app = started_app();
        run_block(
            &mut app,
            1_005,
            &[
                Operation::Undelegate {
                    delegator: VAL1.to_string(),
                    validator: VAL1.to_string(),
                    amount: 1_000_000,
                },
                Operation::StoreCode {
                    creator: ALICE.to_string(),
                    code: b"reflect".to_vec(),
                },
            ],
        );
        run_block(
            &mut app,
            1_010,
            &[
                Operation::Instantiate {
                    creator: ALICE.to_string(),
                    code_id: 1,
                    label: "counter".to_string(),
                    init_count: 3,
                },
                Operation::SubmitProposal {
                    proposer: BOB.to_string(),
                    title: "raise cap".to_string(),
                    deposit: 5_000,
                },
            ],
        );

        let exported = app.export_state().unwrap();
        let mut imported = LedgerAppFactory
            .new_instance(&StoreLocation::Memory, &AppOptions::default().with_faux_merkle(true))
            .unwrap();
        imported.init_from_export(&exported).unwrap();
        assert_eq!(imported.last_block_height(), app.last_block_height());

        let registry = decoder_registry();
        for comparison in ledger_store_comparisons() {
            let a = app.namespace_store(&comparison.namespace).unwrap();
            let b = imported.namespace_store(&comparison.namespace).unwrap();
            let diff = comparison.compare(&a, &b);
            assert!(
                diff.is_empty(),
                "{}",
                render_diff(&comparison.namespace, &registry, &diff)
            );
        }

        // The counter key is only present on the executing side.
        let wasm = app.namespace_store(keys::WASM).unwrap();
        assert!(wasm.get(keys::wasm::TX_COUNTER).is_some());
    }

    #[test]
    fn test_export_ignores_open_block() {
        let mut app = started_app();
        let committed = app.export_state().unwrap();

        app.begin_block(header(app.next_height(), 1_005)).unwrap();
        app.deliver(&Operation::Send {
            from: ALICE.to_string(),
            to: "chainsim1carol".to_string(),
            denom: "ucoin".to_string(),
            amount: 1_000,
            fee: 10,
        })
        .unwrap();

        let exported = app.export_state().unwrap();
        assert_eq!(exported.height, committed.height);
        assert_eq!(exported.app_state, committed.app_state);
        assert_eq!(exported.consensus_params, committed.consensus_params);

        // The open block is still there for the running instance.
        assert_eq!(app.balance("chainsim1carol", "ucoin").unwrap(), 1_000);
    }

    #[test]
    fn test_disk_instance_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = LedgerAppFactory
            .new_instance(&StoreLocation::Disk(dir.path().to_path_buf()), &AppOptions::default())
            .unwrap();
        app.init_chain(&fixture_genesis(), &ConsensusParams::default(), 1)
            .unwrap();
        run_block(&mut app, 1_000, &[]);

        let stats = app.store_stats().unwrap();
        assert_eq!(stats.namespaces, keys::NAMESPACES.len());
        assert!(stats.keys > 0);
        assert!(stats.size_on_disk.is_some());
    }
}
