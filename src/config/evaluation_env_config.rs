//! Evaluation scheduling configuration parsing from environment variables.
//!
//! Covers the cycle cadence, the dispatcher's worker pool, and the shape of
//! the backtest request (instrument universe, lookback, intervals).

use anyhow::{Context, Result};
use std::env;

/// Evaluation environment configuration
#[derive(Debug, Clone)]
pub struct EvaluationEnvConfig {
    pub cycle_interval_secs: u64,
    /// Dispatcher worker count. Typical values sit in 4–12; clamped to at
    /// least 1.
    pub eval_concurrency: usize,
    pub eval_task_timeout_secs: u64,
    pub universe: Vec<String>,
    pub backtest_lookback_days: i64,
    pub intervals: Vec<String>,
}

impl EvaluationEnvConfig {
    pub fn from_env() -> Result<Self> {
        let universe_str = env::var("UNIVERSE").unwrap_or_else(|_| "AAPL,MSFT,NVDA".to_string());
        let universe: Vec<String> = universe_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let intervals_str = env::var("INTERVALS").unwrap_or_else(|_| "1d".to_string());
        let intervals: Vec<String> = intervals_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            cycle_interval_secs: Self::parse_u64("CYCLE_INTERVAL_SECS", 600)?,
            eval_concurrency: Self::parse_usize("EVAL_CONCURRENCY", 8)?.max(1),
            eval_task_timeout_secs: Self::parse_u64("EVAL_TASK_TIMEOUT_SECS", 120)?,
            universe,
            backtest_lookback_days: Self::parse_i64("BACKTEST_LOOKBACK_DAYS", 180)?,
            intervals,
        })
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_u64(key: &str, default: u64) -> Result<u64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u64>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_i64(key: &str, default: i64) -> Result<i64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<i64>()
            .context(format!("Failed to parse {}", key))
    }
}
