//! Export/import consistency check.
//!
//! Runs one simulation on instance A, exports A's state, initializes a fresh
//! instance B from the export and compares both stores namespace by
//! namespace.

use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::exporter::{check_export_simulation, print_stats};
use crate::runner::{check_app_name, setup};
use chainsim_core::{render_diff, DecoderRegistry, NamespaceComparison};
use chainsim_env::{AppFactory, AppOptions, OperationGenerator, Seed, SimApplication};
use serde::Serialize;
use tracing::{info, warn};

/// Comparison result of one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceReport {
    pub namespace: String,
    /// Entries of A and B before exclusions
    pub keys_a: usize,
    pub keys_b: usize,
    pub divergent: usize,
}

/// Result of a passed consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub seed: Seed,
    /// Height A was exported at
    pub height: u64,
    pub namespaces: Vec<NamespaceReport>,
    /// Failure of the simulation on A, recorded but not fatal
    pub simulation_failure: Option<String>,
}

/// Compares the committed stores of `a` and `b`.
///
/// Fails on the first namespace whose divergent sides differ in length
/// (a comparator bug) or that holds any divergent pair.
pub fn compare_app_stores<A, B>(
    a: &A,
    b: &B,
    comparisons: &[NamespaceComparison],
    decoders: &DecoderRegistry,
) -> Result<Vec<NamespaceReport>, SimError>
where
    A: SimApplication,
    B: SimApplication,
{
    let mut reports = Vec::with_capacity(comparisons.len());
    for comparison in comparisons {
        let namespace = comparison.namespace.as_str();
        let store_a = a.namespace_store(namespace)?;
        let store_b = b.namespace_store(namespace)?;

        let diff = comparison.compare(&store_a, &store_b);
        if !diff.is_aligned() {
            return Err(SimError::ComparatorInvariant {
                namespace: namespace.to_string(),
                a_len: diff.a.len(),
                b_len: diff.b.len(),
            });
        }

        info!(namespace, divergent = diff.len(), "compared {} different key/value pairs between A and B", diff.len());
        if !diff.is_empty() {
            return Err(SimError::Consistency {
                namespace: namespace.to_string(),
                divergent: diff.len(),
                log: render_diff(namespace, decoders, &diff),
            });
        }

        reports.push(NamespaceReport {
            namespace: namespace.to_string(),
            keys_a: store_a.len(),
            keys_b: store_b.len(),
            divergent: 0,
        });
    }
    Ok(reports)
}

/// Runs the export/import round trip from `config.seed`.
///
/// Both instances use disk-backed stores with the flat commitment.
pub fn run_import_export<F, G>(
    factory: &F,
    generator: &mut G,
    config: &SimulationConfig,
    comparisons: &[NamespaceComparison],
    decoders: &DecoderRegistry,
) -> Result<ConsistencyReport, SimError>
where
    F: AppFactory,
    G: OperationGenerator<F::App>,
{
    let options = AppOptions::default().with_faux_merkle(true);

    let mut a = setup(factory, config, &options, true)?;
    check_app_name(&a.app, factory.app_name())?;

    let outcome = generator.simulate_from_seed(&mut a.app, &config.run_params(config.seed));
    check_export_simulation(&a.app, config, &outcome)?;
    if let Some(failure) = &outcome.failure {
        warn!(seed = config.seed, %failure, "simulation on A failed; checking consistency anyway");
    }
    if config.commit {
        print_stats(&outcome);
    }

    info!(height = a.app.last_block_height(), "exporting genesis");
    let exported = a.app.export_state()?;

    info!("importing genesis");
    let mut b = setup(factory, config, &options, true)?;
    check_app_name(&b.app, factory.app_name())?;
    b.app.init_from_export(&exported)?;

    let namespaces = compare_app_stores(&a.app, &b.app, comparisons, decoders)?;
    info!(
        namespaces = namespaces.len(),
        height = exported.height,
        "export/import consistent"
    );

    Ok(ConsistencyReport {
        seed: config.seed,
        height: exported.height,
        namespaces,
        simulation_failure: outcome.failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::RandomOperationGenerator;
    use chainsim_core::ledger::{decoder_registry, keys, ledger_store_comparisons, Operation};
    use chainsim_core::{LedgerApp, LedgerAppFactory};
    use chainsim_env::{
        BlockHeader, CommitId, EnvError, ExportedApp, KvPair, NamespaceSnapshot, RunParams, SimulationOutcome,
    };

    /// Serves fixed snapshots.
    struct SnapshotApp {
        stores: Vec<NamespaceSnapshot>,
    }

    impl SimApplication for SnapshotApp {
        fn name(&self) -> &str {
            "snapshot"
        }

        fn last_block_height(&self) -> u64 {
            0
        }

        fn last_commit_id(&self) -> CommitId {
            CommitId::default()
        }

        fn namespace_store(&self, namespace: &str) -> Result<NamespaceSnapshot, EnvError> {
            Ok(self
                .stores
                .iter()
                .find(|s| s.namespace() == namespace)
                .cloned()
                .unwrap_or_else(|| NamespaceSnapshot::new(namespace)))
        }

        fn export_state(&self) -> Result<ExportedApp, EnvError> {
            Err(EnvError::export("not supported"))
        }

        fn init_from_export(&mut self, _exported: &ExportedApp) -> Result<(), EnvError> {
            Err(EnvError::import("not supported"))
        }
    }

    fn app(namespace: &str, pairs: Vec<KvPair>) -> SnapshotApp {
        SnapshotApp {
            stores: vec![NamespaceSnapshot::from_pairs(namespace, pairs)],
        }
    }

    #[test]
    fn test_equal_balances_pass() {
        let key = keys::balance_key("addr1", "denom");
        let a = app(keys::BANK, vec![KvPair::new(key.clone(), b"100".to_vec())]);
        let b = app(keys::BANK, vec![KvPair::new(key, b"100".to_vec())]);

        let reports =
            compare_app_stores(&a, &b, &[NamespaceComparison::new(keys::BANK)], &decoder_registry()).unwrap();
        assert_eq!(reports[0].divergent, 0);
        assert_eq!(reports[0].keys_a, 1);
    }

    #[test]
    fn test_queue_key_only_in_a() {
        let queue_key = vec![keys::staking::UNBONDING_QUEUE, 0x01];
        let a = app(keys::STAKING, vec![KvPair::new(queue_key, b"[]".to_vec())]);
        let b = app(keys::STAKING, Vec::new());

        let excluded = NamespaceComparison::new(keys::STAKING).with_excluded_prefix(vec![keys::staking::UNBONDING_QUEUE]);
        compare_app_stores(&a, &b, &[excluded], &decoder_registry()).unwrap();

        let err = compare_app_stores(&a, &b, &[NamespaceComparison::new(keys::STAKING)], &decoder_registry()).unwrap_err();
        match err {
            SimError::Consistency {
                namespace,
                divergent,
                log,
            } => {
                assert_eq!(namespace, keys::STAKING);
                assert_eq!(divergent, 1);
                assert!(log.contains("unbonding queue"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_undecoded_namespace_uses_raw_dump() {
        let a = app("custom", vec![KvPair::new(b"k".to_vec(), b"v1".to_vec())]);
        let b = app("custom", vec![KvPair::new(b"k".to_vec(), b"v2".to_vec())]);

        let err = compare_app_stores(&a, &b, &[NamespaceComparison::new("custom")], &DecoderRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("store A \"k\" => \"v1\"\nstore B \"k\" => \"v2\"\n"));
    }

    #[test]
    fn test_ledger_round_trip_is_consistent() {
        let out = tempfile::tempdir().unwrap();
        let config = SimulationConfig::default()
            .with_seed(7)
            .with_num_blocks(15)
            .with_block_size(10)
            .with_genesis_time(1_700_000_000)
            .with_lean(true)
            .with_export_state_path(out.path().join("state.json"));
        let mut generator = RandomOperationGenerator::from_config(&config).unwrap();

        let report = run_import_export(
            &LedgerAppFactory,
            &mut generator,
            &config,
            &ledger_store_comparisons(),
            &decoder_registry(),
        )
        .unwrap();

        assert_eq!(report.height, 15);
        assert_eq!(report.namespaces.len(), keys::NAMESPACES.len());
        assert!(report.namespaces.iter().all(|n| n.divergent == 0));
        assert!(out.path().join("state.json").is_file());
    }

    /// Runs a normal simulation, then opens one more block, delivers a
    /// transfer into it and reports a failure without committing.
    struct AbortMidBlock {
        inner: RandomOperationGenerator,
    }

    impl AbortMidBlock {
        fn open_block(&self, app: &mut LedgerApp, chain_id: &str) -> Result<(), String> {
            let proposer = app
                .validators()
                .map_err(|e| e.to_string())?
                .first()
                .map(|v| v.operator.clone())
                .ok_or("no validators")?;
            let (from, denom, held) = app
                .all_balances()
                .map_err(|e| e.to_string())?
                .into_iter()
                .flat_map(|balance| {
                    let address = balance.address;
                    balance
                        .coins
                        .into_iter()
                        .map(move |(denom, amount)| (address.clone(), denom, amount))
                })
                .max_by_key(|(_, _, amount)| *amount)
                .ok_or("no balances")?;

            let header = BlockHeader {
                chain_id: chain_id.to_string(),
                height: app.next_height(),
                time: self.inner.provisioner().genesis_time() + 1_000,
                proposer,
            };
            app.begin_block(header).map_err(|e| e.to_string())?;
            app.deliver(&Operation::Send {
                from,
                to: "chainsim1newcomer".to_string(),
                denom,
                amount: held / 10,
                fee: 0,
            })
            .map_err(|e| e.to_string())
        }
    }

    impl OperationGenerator<LedgerApp> for AbortMidBlock {
        fn simulate_from_seed(&mut self, app: &mut LedgerApp, run: &RunParams) -> SimulationOutcome {
            let mut outcome = self.inner.simulate_from_seed(app, run);
            outcome.failure = Some(match self.open_block(app, &run.chain_id) {
                Ok(()) => "invariant broken after operation".to_string(),
                Err(e) => e,
            });
            outcome
        }
    }

    #[test]
    fn test_failure_mid_block_is_recorded_not_fatal() {
        let config = SimulationConfig::default()
            .with_seed(7)
            .with_num_blocks(5)
            .with_block_size(10)
            .with_genesis_time(1_700_000_000)
            .with_lean(true);
        let mut generator = AbortMidBlock {
            inner: RandomOperationGenerator::from_config(&config).unwrap(),
        };

        let report = run_import_export(
            &LedgerAppFactory,
            &mut generator,
            &config,
            &ledger_store_comparisons(),
            &decoder_registry(),
        )
        .unwrap();

        assert_eq!(
            report.simulation_failure.as_deref(),
            Some("invariant broken after operation")
        );
        assert_eq!(report.height, 5);
        assert!(report.namespaces.iter().all(|n| n.divergent == 0));
    }
}
