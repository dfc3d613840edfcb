//! Multi-objective fitness scoring.
//!
//! Six sub-metrics are normalized to [0, 1] by a linear clamp against
//! configurable bounds, weighted, and summed into a single [0, 100] score.
//! Drawdown and holding time are inverted (smaller is better). A non-finite
//! or missing sub-metric contributes zero to its weighted term; it never
//! aborts scoring. Zero-sample results score 0 and are flagged so ranking
//! decisions that need confidence can exclude them.

use crate::domain::errors::CalibrationError;
use crate::domain::evaluation::{EvaluationResult, EvaluationSource};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Linear normalization bounds for one raw metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBounds {
    pub min: f64,
    pub max: f64,
}

impl MetricBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `(value - min) / (max - min)` clipped to [0, 1].
    pub fn normalize(&self, value: f64) -> f64 {
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

/// Weights for the six sub-metrics. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessWeights {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub max_drawdown: f64,
    pub profit_factor: f64,
    pub avg_holding_days: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            total_return: 0.30,
            sharpe_ratio: 0.25,
            win_rate: 0.15,
            max_drawdown: 0.15,
            profit_factor: 0.10,
            avg_holding_days: 0.05,
        }
    }
}

impl FitnessWeights {
    pub fn sum(&self) -> f64 {
        self.total_return
            + self.sharpe_ratio
            + self.win_rate
            + self.max_drawdown
            + self.profit_factor
            + self.avg_holding_days
    }
}

/// Normalization bounds and weights for fitness scoring.
///
/// Loaded from a TOML calibration file or defaulted; bounds are policy
/// choices, recalibrated without code change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessCalibration {
    pub weights: FitnessWeights,
    pub total_return: MetricBounds,
    pub sharpe_ratio: MetricBounds,
    pub win_rate: MetricBounds,
    pub max_drawdown: MetricBounds,
    pub profit_factor: MetricBounds,
    pub avg_holding_days: MetricBounds,
}

impl Default for FitnessCalibration {
    fn default() -> Self {
        Self {
            weights: FitnessWeights::default(),
            total_return: MetricBounds::new(-20.0, 60.0),
            sharpe_ratio: MetricBounds::new(-1.0, 3.0),
            win_rate: MetricBounds::new(25.0, 75.0),
            max_drawdown: MetricBounds::new(0.0, 40.0),
            profit_factor: MetricBounds::new(0.5, 3.0),
            avg_holding_days: MetricBounds::new(0.0, 30.0),
        }
    }
}

impl FitnessCalibration {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(CalibrationError::WeightSum { sum });
        }

        for (metric, bounds) in [
            ("total_return", self.total_return),
            ("sharpe_ratio", self.sharpe_ratio),
            ("win_rate", self.win_rate),
            ("max_drawdown", self.max_drawdown),
            ("profit_factor", self.profit_factor),
            ("avg_holding_days", self.avg_holding_days),
        ] {
            if bounds.min >= bounds.max {
                return Err(CalibrationError::DegenerateBounds {
                    metric: metric.to_string(),
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }

        Ok(())
    }
}

/// A normalized [0, 100] fitness score, carrying the evaluation it was
/// derived from. Never persisted independently of its source result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessScore {
    pub strategy_id: Uuid,
    pub value: f64,
    pub source: EvaluationSource,
    /// Set when the source carried zero samples; the score is 0 and must not
    /// drive decisions that require confidence.
    pub insufficient_data: bool,
    pub result: EvaluationResult,
}

/// Turns raw evaluation results into fitness scores.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    calibration: FitnessCalibration,
}

impl FitnessEvaluator {
    pub fn new(calibration: FitnessCalibration) -> Result<Self, CalibrationError> {
        calibration.validate()?;
        Ok(Self { calibration })
    }

    pub fn calibration(&self) -> &FitnessCalibration {
        &self.calibration
    }

    pub fn score(&self, result: &EvaluationResult) -> FitnessScore {
        if result.is_insufficient() {
            return FitnessScore {
                strategy_id: result.strategy_id,
                value: 0.0,
                source: result.source,
                insufficient_data: true,
                result: result.clone(),
            };
        }

        let m = &result.metrics;
        let c = &self.calibration;
        let w = &c.weights;

        let mut total = 0.0;
        total += w.total_return * direct(c.total_return, decimal_to_f64(m.total_return_pct));
        total += w.sharpe_ratio * direct(c.sharpe_ratio, m.sharpe_ratio);
        total += w.win_rate * direct(c.win_rate, decimal_to_f64(m.win_rate_pct));
        total += w.max_drawdown * inverted(c.max_drawdown, decimal_to_f64(m.max_drawdown_pct));
        total += w.profit_factor * direct(c.profit_factor, m.profit_factor);
        total += w.avg_holding_days * inverted(c.avg_holding_days, m.avg_holding_days);

        FitnessScore {
            strategy_id: result.strategy_id,
            value: (total * 100.0).clamp(0.0, 100.0),
            source: result.source,
            insufficient_data: false,
            result: result.clone(),
        }
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

fn direct(bounds: MetricBounds, value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    bounds.normalize(value)
}

fn inverted(bounds: MetricBounds, value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    1.0 - bounds.normalize(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::EvaluationMetrics;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn result_with(metrics: EvaluationMetrics) -> EvaluationResult {
        let now = Utc::now();
        EvaluationResult {
            strategy_id: Uuid::new_v4(),
            source: EvaluationSource::Backtest,
            metrics,
            period_start: now - Duration::days(180),
            period_end: now,
            failure: None,
        }
    }

    fn baseline_metrics() -> EvaluationMetrics {
        EvaluationMetrics {
            total_return_pct: dec!(20.0),
            sharpe_ratio: 1.0,
            win_rate_pct: dec!(50.0),
            max_drawdown_pct: dec!(20.0),
            profit_factor: 1.75,
            avg_holding_days: 15.0,
            sample_count: 60,
        }
    }

    fn score_of(metrics: EvaluationMetrics) -> f64 {
        let evaluator = FitnessEvaluator::new(FitnessCalibration::default()).unwrap();
        evaluator.score(&result_with(metrics)).value
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!((FitnessWeights::default().sum() - 1.0).abs() < 1e-12);
        FitnessCalibration::default().validate().unwrap();
    }

    #[test]
    fn test_baseline_sits_mid_range() {
        // Every metric at its range midpoint scores exactly 50.
        let value = score_of(baseline_metrics());
        assert!((value - 50.0).abs() < 1e-9, "got {value}");
    }

    #[test]
    fn test_score_monotonic_in_direct_metrics() {
        let base = score_of(baseline_metrics());

        let mut better = baseline_metrics();
        better.total_return_pct = dec!(35.0);
        assert!(score_of(better) > base);

        let mut better = baseline_metrics();
        better.sharpe_ratio = 2.0;
        assert!(score_of(better) > base);

        let mut better = baseline_metrics();
        better.win_rate_pct = dec!(62.0);
        assert!(score_of(better) > base);

        let mut better = baseline_metrics();
        better.profit_factor = 2.5;
        assert!(score_of(better) > base);
    }

    #[test]
    fn test_score_monotonic_in_inverted_metrics() {
        let base = score_of(baseline_metrics());

        let mut worse = baseline_metrics();
        worse.max_drawdown_pct = dec!(35.0);
        assert!(score_of(worse) < base);

        let mut worse = baseline_metrics();
        worse.avg_holding_days = 25.0;
        assert!(score_of(worse) < base);
    }

    #[test]
    fn test_zero_samples_scores_zero_and_flags() {
        let evaluator = FitnessEvaluator::new(FitnessCalibration::default()).unwrap();
        let mut metrics = baseline_metrics();
        metrics.sample_count = 0;

        let score = evaluator.score(&result_with(metrics));
        assert_eq!(score.value, 0.0);
        assert!(score.insufficient_data);
    }

    #[test]
    fn test_non_finite_metric_contributes_zero() {
        let mut metrics = baseline_metrics();
        metrics.profit_factor = f64::INFINITY;

        // Losing the 0.10-weighted mid-range profit factor term drops the
        // score by exactly 5 points.
        let value = score_of(metrics);
        assert!((value - 45.0).abs() < 1e-9, "got {value}");
    }

    #[test]
    fn test_score_clamps_to_range() {
        let mut metrics = baseline_metrics();
        metrics.total_return_pct = dec!(500.0);
        metrics.sharpe_ratio = 50.0;
        metrics.win_rate_pct = dec!(100.0);
        metrics.max_drawdown_pct = dec!(0.0);
        metrics.profit_factor = 10.0;
        metrics.avg_holding_days = 0.0;

        let value = score_of(metrics);
        assert!((value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_sum_is_validated() {
        let mut calibration = FitnessCalibration::default();
        calibration.weights.total_return = 0.5;

        assert!(matches!(
            FitnessEvaluator::new(calibration),
            Err(CalibrationError::WeightSum { .. })
        ));
    }
}
