//! Configuration module for Evotrade.
//!
//! This module provides structured configuration loading from environment
//! variables, organized by domain: Evolution, Evaluation, and Deployment.
//! Fitness calibration (normalization bounds and weights) can additionally
//! be loaded from a TOML file via `FITNESS_CALIBRATION_FILE`.

mod deployment_env_config;
mod evaluation_env_config;
mod evolution_env_config;

pub use deployment_env_config::DeploymentEnvConfig;
pub use evaluation_env_config::EvaluationEnvConfig;
pub use evolution_env_config::EvolutionEnvConfig;

use crate::application::evaluation::dispatcher::DispatchLimits;
use crate::application::evolution::generation_manager::EvolutionParams;
use crate::application::live::deployment_gate::PromotionPolicy;
use crate::application::live::reconciler::ReconcilePolicy;
use crate::application::supervisor::SupervisorSettings;
use crate::domain::fitness::FitnessCalibration;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

/// Main application configuration.
///
/// Aggregates all sub-module configuration and provides converters into the
/// value objects each component consumes.
#[derive(Debug, Clone)]
pub struct Config {
    // Evolution
    pub population_size: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub elite_fraction: f64,
    pub tournament_size: usize,
    pub seed: Option<u64>,
    pub max_generations: Option<u64>,

    // Evaluation
    pub cycle_interval_secs: u64,
    pub eval_concurrency: usize,
    pub eval_task_timeout_secs: u64,
    pub universe: Vec<String>,
    pub backtest_lookback_days: i64,
    pub intervals: Vec<String>,

    // Deployment
    pub min_backtest_window_days: i64,
    pub min_sample_count: usize,
    pub min_win_rate_pct: f64,
    pub divergence_threshold: f64,
    pub removal_flag_count: u32,
    pub paper_window_days: i64,
    pub live_history_len: usize,

    // Fitness
    pub fitness: FitnessCalibration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let evolution = EvolutionEnvConfig::from_env().context("Failed to load evolution config")?;
        let evaluation =
            EvaluationEnvConfig::from_env().context("Failed to load evaluation config")?;
        let deployment =
            DeploymentEnvConfig::from_env().context("Failed to load deployment config")?;

        let fitness = match env::var("FITNESS_CALIBRATION_FILE") {
            Ok(path) => Self::load_calibration(Path::new(&path))?,
            Err(_) => FitnessCalibration::default(),
        };

        Ok(Self {
            // Evolution
            population_size: evolution.population_size,
            mutation_rate: evolution.mutation_rate,
            crossover_rate: evolution.crossover_rate,
            elite_fraction: evolution.elite_fraction,
            tournament_size: evolution.tournament_size,
            seed: evolution.seed,
            max_generations: evolution.max_generations,

            // Evaluation
            cycle_interval_secs: evaluation.cycle_interval_secs,
            eval_concurrency: evaluation.eval_concurrency,
            eval_task_timeout_secs: evaluation.eval_task_timeout_secs,
            universe: evaluation.universe,
            backtest_lookback_days: evaluation.backtest_lookback_days,
            intervals: evaluation.intervals,

            // Deployment
            min_backtest_window_days: deployment.min_backtest_window_days,
            min_sample_count: deployment.min_sample_count,
            min_win_rate_pct: deployment.min_win_rate_pct,
            divergence_threshold: deployment.divergence_threshold,
            removal_flag_count: deployment.removal_flag_count,
            paper_window_days: deployment.paper_window_days,
            live_history_len: deployment.live_history_len,

            fitness,
        })
    }

    /// Load fitness calibration from a TOML file.
    pub fn load_calibration(path: &Path) -> Result<FitnessCalibration> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read calibration file {}", path.display()))?;
        let calibration: FitnessCalibration = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse calibration file {}", path.display()))?;
        calibration
            .validate()
            .with_context(|| format!("Invalid calibration in {}", path.display()))?;
        Ok(calibration)
    }

    pub fn to_evolution_params(&self) -> EvolutionParams {
        EvolutionParams {
            population_size: self.population_size,
            mutation_rate: self.mutation_rate,
            crossover_rate: self.crossover_rate,
            elite_fraction: self.elite_fraction,
            tournament_size: self.tournament_size,
        }
    }

    pub fn to_dispatch_limits(&self) -> DispatchLimits {
        DispatchLimits {
            concurrency: self.eval_concurrency,
            task_timeout: std::time::Duration::from_secs(self.eval_task_timeout_secs),
        }
    }

    pub fn to_promotion_policy(&self) -> PromotionPolicy {
        PromotionPolicy {
            min_backtest_window: chrono::Duration::days(self.min_backtest_window_days),
            min_sample_count: self.min_sample_count,
            min_win_rate_pct: self.min_win_rate_pct,
            removal_flag_count: self.removal_flag_count,
        }
    }

    pub fn to_reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            divergence_threshold: self.divergence_threshold,
            paper_window: chrono::Duration::days(self.paper_window_days),
            history_len: self.live_history_len,
        }
    }

    pub fn to_supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            cycle_interval: std::time::Duration::from_secs(self.cycle_interval_secs),
            max_generations: self.max_generations,
            universe: self.universe.clone(),
            backtest_lookback_days: self.backtest_lookback_days,
            intervals: self.intervals.clone(),
        }
    }
}
