//! Instance setup and the single-run simulation driver.

use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::exporter::{check_export_simulation, ensure_export_dirs, print_stats};
use chainsim_env::{AppFactory, AppOptions, OperationGenerator, SimApplication, SimulationOutcome, StoreLocation};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

/// An application instance plus the temporary directory backing its store.
///
/// The directory is removed when the instance is dropped.
pub struct SimInstance<A> {
    pub app: A,
    dir: Option<TempDir>,
}

impl<A> SimInstance<A> {
    /// Directory of the on-disk store, if the instance has one.
    pub fn store_dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }
}

/// Prepares a run: creates export directories and opens a fresh instance.
///
/// With `durable` set the store lives in a new temporary directory,
/// otherwise in memory.
pub fn setup<F: AppFactory>(
    factory: &F,
    config: &SimulationConfig,
    options: &AppOptions,
    durable: bool,
) -> Result<SimInstance<F::App>, SimError> {
    ensure_export_dirs(config)?;

    let dir = if durable {
        Some(tempfile::Builder::new().prefix("chainsim-").tempdir()?)
    } else {
        None
    };
    let location = match &dir {
        Some(dir) => StoreLocation::Disk(dir.path().to_path_buf()),
        None => StoreLocation::Memory,
    };
    let app = factory.new_instance(&location, options)?;
    debug!(?location, app = factory.app_name(), "instance opened");

    Ok(SimInstance { app, dir })
}

/// Fails unless `app` reports the name `expected`.
pub fn check_app_name<A: SimApplication>(app: &A, expected: &str) -> Result<(), SimError> {
    if app.name() != expected {
        return Err(SimError::config(format!(
            "application name mismatch: expected {}, got {}",
            expected,
            app.name()
        )));
    }
    Ok(())
}

/// Runs one simulation from `config.seed` over a disk-backed instance.
///
/// Artifacts are exported before the outcome is inspected; a failed run is
/// returned as an error afterwards.
pub fn run_simulation<F, G>(factory: &F, generator: &mut G, config: &SimulationConfig) -> Result<SimulationOutcome, SimError>
where
    F: AppFactory,
    G: OperationGenerator<F::App>,
{
    let mut instance = setup(factory, config, &AppOptions::default(), true)?;
    check_app_name(&instance.app, factory.app_name())?;

    info!(seed = config.seed, blocks = config.num_blocks, "running simulation");
    let outcome = generator.simulate_from_seed(&mut instance.app, &config.run_params(config.seed));

    check_export_simulation(&instance.app, config, &outcome)?;
    if config.commit {
        print_stats(&outcome);
    }

    if let Some(failure) = &outcome.failure {
        return Err(SimError::simulation(format!("seed {}: {}", config.seed, failure)));
    }
    Ok(outcome)
}
