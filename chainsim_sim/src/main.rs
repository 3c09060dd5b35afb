//! ChainSim CLI
//!
//! Runs determinism campaigns, export/import consistency checks and single
//! simulations against the reference ledger application.

use chainsim_core::ledger::{decoder_registry, ledger_store_comparisons};
use chainsim_core::LedgerAppFactory;
use chainsim_sim::{
    run_determinism_campaign, run_import_export, run_simulation, CampaignConfig, RandomOperationGenerator, SimError,
    SimulationConfig, SIMULATION_CHAIN_ID,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// ChainSim determinism and state-consistency verification
#[derive(Parser, Debug)]
#[command(name = "chainsim")]
#[command(about = "Verify simulation determinism and export/import consistency", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    sim: SimArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every seed several times and require identical commitments
    Determinism {
        /// Number of random seeds
        #[arg(long, default_value = "3")]
        num_seeds: usize,

        /// Runs per seed
        #[arg(long, default_value = "5")]
        runs_per_seed: usize,
    },

    /// Export state after a simulation, import it into a fresh instance and compare
    ImportExport,

    /// Run a single simulation
    Simulate,
}

#[derive(clap::Args, Debug)]
struct SimArgs {
    /// Genesis document (JSON)
    #[arg(long, global = true)]
    genesis: Option<PathBuf>,

    /// Simulation-parameters document (JSON)
    #[arg(long, global = true)]
    params: Option<PathBuf>,

    /// Write the exported app state here
    #[arg(long, global = true)]
    export_state_path: Option<PathBuf>,

    /// Write the simulation params used here
    #[arg(long, global = true)]
    export_params_path: Option<PathBuf>,

    /// Write operation statistics here
    #[arg(long, global = true)]
    export_stats_path: Option<PathBuf>,

    /// Master seed
    #[arg(short, long, global = true, default_value = "42", allow_negative_numbers = true)]
    seed: i64,

    /// Height of the first block
    #[arg(long, global = true, default_value = "1")]
    initial_height: u64,

    /// Blocks per run
    #[arg(long, global = true, default_value = "50")]
    num_blocks: u64,

    /// Mean operations per block
    #[arg(long, global = true, default_value = "20")]
    block_size: u32,

    #[arg(long, global = true, default_value = SIMULATION_CHAIN_ID)]
    chain_id: String,

    /// Genesis time, unix seconds (default: now)
    #[arg(long, global = true)]
    genesis_time: Option<i64>,

    /// Report store statistics after each run
    #[arg(long, global = true)]
    commit: bool,

    /// Check invariants after every block
    #[arg(long, global = true)]
    all_invariants: bool,

    /// Check invariants after every operation
    #[arg(long, global = true)]
    on_operation: bool,

    /// Invariant check period in blocks (0 = never)
    #[arg(long, global = true, default_value = "1")]
    period: u64,

    /// Suppress per-operation logging
    #[arg(long, global = true)]
    lean: bool,
}

impl SimArgs {
    fn to_config(&self) -> SimulationConfig {
        SimulationConfig {
            genesis_file: self.genesis.clone(),
            params_file: self.params.clone(),
            export_state_path: self.export_state_path.clone(),
            export_params_path: self.export_params_path.clone(),
            export_stats_path: self.export_stats_path.clone(),
            seed: self.seed,
            initial_height: self.initial_height,
            num_blocks: self.num_blocks,
            block_size: self.block_size,
            chain_id: self.chain_id.clone(),
            genesis_time: self.genesis_time,
            commit: self.commit,
            all_invariants: self.all_invariants,
            on_operation: self.on_operation,
            invariant_period: self.period,
            lean: self.lean,
        }
    }
}

fn run(command: &Command, config: &SimulationConfig) -> Result<serde_json::Value, SimError> {
    match command {
        Command::Determinism {
            num_seeds,
            runs_per_seed,
        } => {
            let campaign = CampaignConfig {
                num_seeds: *num_seeds,
                runs_per_seed: *runs_per_seed,
            };
            let report = run_determinism_campaign(
                &LedgerAppFactory,
                RandomOperationGenerator::from_config,
                config,
                &campaign,
            )?;
            Ok(serde_json::to_value(report)?)
        }
        Command::ImportExport => {
            let mut generator = RandomOperationGenerator::from_config(config)?;
            let report = run_import_export(
                &LedgerAppFactory,
                &mut generator,
                config,
                &ledger_store_comparisons(),
                &decoder_registry(),
            )?;
            Ok(serde_json::to_value(report)?)
        }
        Command::Simulate => {
            let mut generator = RandomOperationGenerator::from_config(config)?;
            let outcome = run_simulation(&LedgerAppFactory, &mut generator, config)?;
            Ok(serde_json::json!({
                "seed": config.seed,
                "blocks": outcome.blocks,
                "height": outcome.final_commit.version,
                "commitment": outcome.final_commit.hash.to_hex(),
                "operations": outcome.stats,
            }))
        }
    }
}

fn main() {
    let args = Args::parse();

    // Logs go to stderr so --json output stays parseable
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("ChainSim v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let config = args.sim.to_config();
    let result = run(&args.command, &config);

    if args.json {
        let summary = match &result {
            Ok(report) => serde_json::json!({ "passed": true, "report": report }),
            Err(e) => serde_json::json!({ "passed": false, "kind": e.kind(), "error": e.to_string() }),
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to render summary: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        match &result {
            Ok(_) => info!("✅ {:?} passed (seed={})", args.command, config.seed),
            Err(e) => error!("❌ {}", e),
        }
    }

    // Exit with proper code for CI
    if result.is_err() {
        std::process::exit(1);
    }
}
