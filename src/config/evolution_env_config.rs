//! Genetic algorithm configuration parsing from environment variables.
//!
//! Covers population sizing, operator rates, selection pressure, and the
//! optional reproducibility seed.

use anyhow::{Context, Result};
use std::env;

/// Evolution environment configuration
#[derive(Debug, Clone)]
pub struct EvolutionEnvConfig {
    pub population_size: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub elite_fraction: f64,
    pub tournament_size: usize,
    /// Fixed seed for reproducible runs; unset draws from OS entropy.
    pub seed: Option<u64>,
    /// Bounds the supervisor, not the generation manager. Unset runs forever.
    pub max_generations: Option<u64>,
}

impl EvolutionEnvConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            population_size: Self::parse_usize("POPULATION_SIZE", 24)?,
            mutation_rate: Self::parse_f64("MUTATION_RATE", 0.15)?,
            crossover_rate: Self::parse_f64("CROSSOVER_RATE", 0.70)?,
            elite_fraction: Self::parse_f64("ELITE_FRACTION", 0.20)?,
            tournament_size: Self::parse_usize("TOURNAMENT_SIZE", 3)?,
            seed: env::var("GA_SEED").ok().and_then(|s| s.parse::<u64>().ok()),
            max_generations: env::var("MAX_GENERATIONS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            anyhow::bail!("POPULATION_SIZE must be at least 2");
        }
        for (key, rate) in [
            ("MUTATION_RATE", self.mutation_rate),
            ("CROSSOVER_RATE", self.crossover_rate),
            ("ELITE_FRACTION", self.elite_fraction),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                anyhow::bail!("{} must be within [0, 1], got {}", key, rate);
            }
        }
        if self.tournament_size < 1 {
            anyhow::bail!("TOURNAMENT_SIZE must be at least 1");
        }
        Ok(())
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }
}
