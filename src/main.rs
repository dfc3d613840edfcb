//! Evotrade daemon — headless continuous strategy-optimization engine.
//!
//! Runs the supervisor loop against simulated collaborators: each cycle
//! evolves a generation of strategy genomes, evaluates them in parallel,
//! ranks and persists the cohort, then reconciles live paper-trading
//! feedback against the deployment gate. Wiring a real backtest engine,
//! paper venue, or durable store means implementing the `domain::ports`
//! traits and swapping them in here.
//!
//! # Usage
//! ```sh
//! CYCLE_INTERVAL_SECS=600 cargo run -- --max-generations 50
//! ```
//!
//! # Environment Variables
//! - `POPULATION_SIZE`, `MUTATION_RATE`, `CROSSOVER_RATE`, `ELITE_FRACTION`,
//!   `TOURNAMENT_SIZE`, `GA_SEED` — genetic algorithm shape
//! - `CYCLE_INTERVAL_SECS`, `EVAL_CONCURRENCY`, `EVAL_TASK_TIMEOUT_SECS`,
//!   `UNIVERSE`, `BACKTEST_LOOKBACK_DAYS`, `INTERVALS` — evaluation cadence
//! - `MIN_BACKTEST_WINDOW_DAYS`, `MIN_SAMPLE_COUNT`, `MIN_WIN_RATE_PCT`,
//!   `DIVERGENCE_THRESHOLD`, `REMOVAL_FLAG_COUNT` — deployment policy
//! - `FITNESS_CALIBRATION_FILE` — TOML file overriding fitness bounds/weights
//! - `STATUS_INTERVAL` — seconds between JSON status lines (default: 60)

use anyhow::Result;
use clap::Parser;
use evotrade::application::evaluation::dispatcher::EvaluationDispatcher;
use evotrade::application::evolution::generation_manager::GenerationManager;
use evotrade::application::live::deployment_gate::DeploymentGate;
use evotrade::application::live::reconciler::LiveFeedbackReconciler;
use evotrade::application::supervisor::OptimizationSupervisor;
use evotrade::config::Config;
use evotrade::domain::fitness::FitnessEvaluator;
use evotrade::domain::genome::GeneSchema;
use evotrade::infrastructure::InMemoryGenerationStore;
use evotrade::infrastructure::mock::{SimulatedBacktester, SimulatedPaperVenue};
use evotrade::infrastructure::observability::StatusReporter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "evotrade", version, about = "Continuous GA strategy-optimization engine")]
struct Cli {
    /// Fixed seed for a reproducible run (overrides GA_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many generations (overrides MAX_GENERATIONS)
    #[arg(long)]
    max_generations: Option<u64>,

    /// Seconds between cycles (overrides CYCLE_INTERVAL_SECS)
    #[arg(long)]
    cycle_interval_secs: Option<u64>,

    /// Fitness calibration TOML (overrides FITNESS_CALIBRATION_FILE)
    #[arg(long)]
    calibration: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging (stdout only)
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Evotrade {} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(max) = cli.max_generations {
        config.max_generations = Some(max);
    }
    if let Some(secs) = cli.cycle_interval_secs {
        config.cycle_interval_secs = secs;
    }
    if let Some(path) = &cli.calibration {
        config.fitness = Config::load_calibration(path)?;
    }

    info!(
        "Configuration loaded: population={}, interval={}s, universe={:?}",
        config.population_size, config.cycle_interval_secs, config.universe
    );

    // Wire collaborators. Simulated stand-ins here; real venues implement
    // the same ports.
    let store = Arc::new(InMemoryGenerationStore::new());
    let backtester = Arc::new(SimulatedBacktester::new());
    let venue = Arc::new(SimulatedPaperVenue::new());

    let evaluator = FitnessEvaluator::new(config.fitness.clone())?;
    let manager = GenerationManager::new(
        GeneSchema::momentum_v1(),
        config.to_evolution_params(),
        evaluator.clone(),
        EvaluationDispatcher::new(backtester, config.to_dispatch_limits()),
        store.clone(),
        config.seed,
    );

    let gate = Arc::new(DeploymentGate::new(config.to_promotion_policy(), store));
    let reconciler = LiveFeedbackReconciler::new(
        venue.clone(),
        gate.clone(),
        evaluator,
        config.to_reconcile_policy(),
    );

    let (supervisor, handle) = OptimizationSupervisor::new(
        manager,
        reconciler,
        gate,
        venue,
        config.to_supervisor_settings(),
    );

    // Push-based status lines for headless operation
    let status_interval = std::env::var("STATUS_INTERVAL")
        .unwrap_or_else(|_| "60".to_string())
        .parse::<u64>()
        .unwrap_or(60);
    let reporter = StatusReporter::new(handle.clone(), status_interval);
    tokio::spawn(async move {
        reporter.run().await;
    });

    info!("Supervisor running. Press Ctrl+C to shutdown.");
    let mut runner = tokio::spawn(supervisor.run());

    tokio::select! {
        // Bounded run or fatal failure.
        result = &mut runner => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Finishing current cycle...");
            handle.shutdown().await;
            runner.await??;
        }
    }

    let status = handle.status().await;
    info!(
        "Stopped at generation {:?} (best score {:?})",
        status.generation, status.best_score
    );

    Ok(())
}
