//! Deployment policy configuration parsing from environment variables.
//!
//! Covers the promotion preconditions, the divergence tolerance, and the
//! consecutive-flag removal count. Defaults here are policy choices, not
//! derived figures.

use anyhow::{Context, Result};
use std::env;

/// Deployment environment configuration
#[derive(Debug, Clone)]
pub struct DeploymentEnvConfig {
    pub min_backtest_window_days: i64,
    pub min_sample_count: usize,
    pub min_win_rate_pct: f64,
    /// Negative relative tolerance; −0.30 flags live fitness at or below
    /// 70% of the backtest baseline.
    pub divergence_threshold: f64,
    pub removal_flag_count: u32,
    pub paper_window_days: i64,
    pub live_history_len: usize,
}

impl DeploymentEnvConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            min_backtest_window_days: Self::parse_i64("MIN_BACKTEST_WINDOW_DAYS", 90)?,
            min_sample_count: Self::parse_usize("MIN_SAMPLE_COUNT", 30)?,
            min_win_rate_pct: Self::parse_f64("MIN_WIN_RATE_PCT", 45.0)?,
            divergence_threshold: Self::parse_f64("DIVERGENCE_THRESHOLD", -0.30)?,
            removal_flag_count: Self::parse_u32("REMOVAL_FLAG_COUNT", 2)?,
            paper_window_days: Self::parse_i64("PAPER_WINDOW_DAYS", 14)?,
            live_history_len: Self::parse_usize("LIVE_HISTORY_LEN", 12)?,
        };

        if !(-1.0..0.0).contains(&config.divergence_threshold) {
            anyhow::bail!(
                "DIVERGENCE_THRESHOLD must be within (-1, 0), got {}",
                config.divergence_threshold
            );
        }
        if config.removal_flag_count < 1 {
            anyhow::bail!("REMOVAL_FLAG_COUNT must be at least 1");
        }

        Ok(config)
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_u32(key: &str, default: u32) -> Result<u32> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u32>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_i64(key: &str, default: i64) -> Result<i64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<i64>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }
}
