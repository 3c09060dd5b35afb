//! JSON export of simulation artifacts.
//!
//! Writes the exported application state, the simulation parameters and the
//! operation statistics of a run to the paths configured for it.

use crate::config::SimulationConfig;
use crate::error::SimError;
use chainsim_env::{
    AppParams, ConsensusParams, ExportedApp, ExportedValidator, OperationStats, SimApplication,
    SimulationOutcome,
};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// On-disk form of an exported application state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateExport {
    /// Height the state was exported at
    pub height: u64,

    pub validators: Vec<ExportedValidator>,

    pub consensus_params: ConsensusParams,

    /// Application state document (embedded as JSON when it is JSON)
    pub app_state: serde_json::Value,
}

impl StateExport {
    pub fn new(exported: &ExportedApp) -> Self {
        let app_state = serde_json::from_slice(&exported.app_state)
            .unwrap_or_else(|_| serde_json::Value::String(hex::encode(&exported.app_state)));
        Self {
            height: exported.height,
            validators: exported.validators.clone(),
            consensus_params: exported.consensus_params.clone(),
            app_state,
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> Result<(), SimError> {
        write_json(path, self)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SimError> {
    let json = serde_json::to_string_pretty(value)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Creates the parent directories of every configured export path.
pub fn ensure_export_dirs(config: &SimulationConfig) -> Result<(), SimError> {
    let paths = [
        &config.export_state_path,
        &config.export_params_path,
        &config.export_stats_path,
    ];
    for path in paths.into_iter().flatten() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn write_params(path: &Path, params: &AppParams) -> Result<(), SimError> {
    write_json(path, params)
}

pub fn write_stats(path: &Path, stats: &OperationStats) -> Result<(), SimError> {
    write_json(path, stats)
}

/// Writes the artifacts of a finished run to the configured paths.
///
/// Runs regardless of whether the simulation failed, so a failing run can
/// still be inspected and replayed.
pub fn check_export_simulation<A: SimApplication>(
    app: &A,
    config: &SimulationConfig,
    outcome: &SimulationOutcome,
) -> Result<(), SimError> {
    if let Some(path) = &config.export_state_path {
        info!(path = %path.display(), "exporting app state");
        let exported = app.export_state()?;
        StateExport::new(&exported).write_to_file(path)?;
    }

    if let Some(path) = &config.export_params_path {
        info!(path = %path.display(), "exporting simulation params");
        write_params(path, &outcome.params)?;
    }

    if let Some(path) = &config.export_stats_path {
        info!(path = %path.display(), "exporting operation stats");
        write_stats(path, &outcome.stats)?;
    }

    Ok(())
}

/// Logs backing-store statistics of a run, when the store reports any.
pub fn print_stats(outcome: &SimulationOutcome) {
    match &outcome.store_stats {
        Some(stats) => info!(%stats, "store statistics"),
        None => warn!("store statistics unavailable"),
    }
    info!("operation stats:\n{}", outcome.stats);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::RandomOperationGenerator;
    use crate::genesis::Provisioner;
    use chainsim_core::LedgerApp;
    use chainsim_env::{OperationGenerator, RunParams};

    #[test]
    fn test_ensure_export_dirs_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("a/b/state.json");
        let stats = dir.path().join("c/stats.json");
        let config = SimulationConfig::default()
            .with_export_state_path(&state)
            .with_export_stats_path(&stats);

        ensure_export_dirs(&config).unwrap();
        assert!(dir.path().join("a/b").is_dir());
        assert!(dir.path().join("c").is_dir());
    }

    #[test]
    fn test_check_export_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimulationConfig::default()
            .with_export_state_path(dir.path().join("state.json"))
            .with_export_params_path(dir.path().join("params.json"))
            .with_export_stats_path(dir.path().join("stats.json"));

        let mut app = LedgerApp::in_memory().unwrap();
        let mut generator = RandomOperationGenerator::new(Provisioner::from_parts(None, AppParams::new(), 0));
        let run = RunParams {
            num_blocks: 2,
            ..RunParams::default()
        };
        let mut outcome = generator.simulate_from_seed(&mut app, &run);
        outcome.params.insert("num_accounts", &4usize).unwrap();
        outcome.stats.record("bank/send", true);
        outcome.failure = Some("stopped".to_string());

        check_export_simulation(&app, &config, &outcome).unwrap();

        let params = AppParams::from_json(&fs::read(dir.path().join("params.json")).unwrap()).unwrap();
        assert_eq!(params.get::<usize>("num_accounts").unwrap(), Some(4));

        let stats: OperationStats = serde_json::from_slice(&fs::read(dir.path().join("stats.json")).unwrap()).unwrap();
        assert!(stats.get("bank/send").ok >= 1);

        let state: StateExport = serde_json::from_slice(&fs::read(dir.path().join("state.json")).unwrap()).unwrap();
        assert_eq!(state.height, 2);
        assert!(state.app_state.is_object());
    }

    #[test]
    fn test_nothing_written_without_paths() {
        let app = LedgerApp::in_memory().unwrap();
        check_export_simulation(&app, &SimulationConfig::default(), &SimulationOutcome::default()).unwrap();
    }
}
