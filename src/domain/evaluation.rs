//! Raw evaluation results from the backtest and paper-trade collaborators.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which venue produced an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    Backtest,
    Paper,
}

impl std::fmt::Display for EvaluationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationSource::Backtest => write!(f, "backtest"),
            EvaluationSource::Paper => write!(f, "paper"),
        }
    }
}

/// Raw performance metrics from one evaluation pass.
///
/// Percentage figures carry `Decimal`; ratio figures are `f64` and may be
/// non-finite when undefined (no losing trades, zero variance). The fitness
/// evaluator treats non-finite values as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub total_return_pct: Decimal,
    pub sharpe_ratio: f64,
    pub win_rate_pct: Decimal,
    pub max_drawdown_pct: Decimal,
    pub profit_factor: f64,
    pub avg_holding_days: f64,
    /// Closed trades backing these figures. Zero means the metrics are
    /// placeholders and fitness is undefined.
    pub sample_count: usize,
}

impl EvaluationMetrics {
    /// Placeholder metrics for a failed or empty evaluation.
    pub fn empty() -> Self {
        Self {
            total_return_pct: Decimal::ZERO,
            sharpe_ratio: 0.0,
            win_rate_pct: Decimal::ZERO,
            max_drawdown_pct: Decimal::ZERO,
            profit_factor: 0.0,
            avg_holding_days: 0.0,
            sample_count: 0,
        }
    }
}

/// One evaluation of one strategy over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub strategy_id: Uuid,
    pub source: EvaluationSource,
    pub metrics: EvaluationMetrics,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Set when the evaluation itself failed (collaborator error, timeout).
    /// Failed results always carry `sample_count == 0`.
    pub failure: Option<String>,
}

impl EvaluationResult {
    /// Failure-marked result standing in for an evaluation that produced no
    /// data. Keeps the one-result-per-genome invariant without poisoning
    /// ranking decisions.
    pub fn failed(
        strategy_id: Uuid,
        source: EvaluationSource,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            strategy_id,
            source,
            metrics: EvaluationMetrics::empty(),
            period_start,
            period_end,
            failure: Some(reason.into()),
        }
    }

    /// Length of the covered period.
    pub fn window(&self) -> Duration {
        self.period_end - self.period_start
    }

    /// True when the result carries no samples and fitness is undefined.
    pub fn is_insufficient(&self) -> bool {
        self.metrics.sample_count == 0
    }
}
