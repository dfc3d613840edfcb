//! Live paper-trading feedback reconciliation.
//!
//! Each pass queries the paper venue for every tracked strategy, scores the
//! live metrics with the same fitness formula as backtests, and compares the
//! live score against the strategy's backtest baseline. Divergence beyond
//! the threshold flags the strategy through the deployment gate; consecutive
//! flags reaching the removal count roll it back (active) or retire it
//! (candidate). The reconciler never writes records itself — it only emits
//! transition requests.

use crate::application::live::deployment_gate::DeploymentGate;
use crate::domain::deployment::{AppliedTransition, DeploymentRecord, TransitionRequest};
use crate::domain::errors::StorageError;
use crate::domain::fitness::{FitnessEvaluator, FitnessScore};
use crate::domain::ports::PaperTradeVenue;
use chrono::Duration;
use futures_util::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Divergence policy and window sizing.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilePolicy {
    /// Relative tolerance, negative. The default −0.30 flags a live score
    /// at or below 70% of the backtest baseline (boundary inclusive).
    pub divergence_threshold: f64,
    /// Trailing window the venue aggregates metrics over.
    pub paper_window: Duration,
    /// Live scores retained per strategy.
    pub history_len: usize,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            divergence_threshold: -0.30,
            paper_window: Duration::days(14),
            history_len: 12,
        }
    }
}

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub examined: usize,
    pub flagged: usize,
    pub cleared: usize,
    pub rolled_back: usize,
    pub retired: usize,
    /// Strategies skipped for missing or insufficient live data.
    pub skipped: usize,
}

pub struct LiveFeedbackReconciler {
    venue: Arc<dyn PaperTradeVenue>,
    gate: Arc<DeploymentGate>,
    evaluator: FitnessEvaluator,
    policy: ReconcilePolicy,
    history: HashMap<Uuid, VecDeque<FitnessScore>>,
}

impl LiveFeedbackReconciler {
    pub fn new(
        venue: Arc<dyn PaperTradeVenue>,
        gate: Arc<DeploymentGate>,
        evaluator: FitnessEvaluator,
        policy: ReconcilePolicy,
    ) -> Self {
        Self {
            venue,
            gate,
            evaluator,
            policy,
            history: HashMap::new(),
        }
    }

    /// Run one reconciliation pass over every tracked strategy.
    pub async fn run_pass(&mut self) -> Result<ReconcileSummary, StorageError> {
        let tracked = self.gate.tracked().await;
        let mut summary = ReconcileSummary {
            examined: tracked.len(),
            ..ReconcileSummary::default()
        };

        let fetches = tracked
            .iter()
            .map(|record| self.venue.metrics(record.strategy_id, self.policy.paper_window));
        let fetched = join_all(fetches).await;

        for (record, outcome) in tracked.iter().zip(fetched) {
            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        strategy_id = %record.strategy_id,
                        "Paper venue metrics unavailable: {e}"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            let score = self.evaluator.score(&result);
            if score.insufficient_data {
                // Not enough live trades for a confident comparison.
                summary.skipped += 1;
                continue;
            }

            self.push_history(record.strategy_id, score.clone());

            let request = if self.diverged(record, score.value) {
                summary.flagged += 1;
                TransitionRequest::FlagUnderperforming {
                    strategy_id: record.strategy_id,
                    live_fitness: score.value,
                }
            } else {
                summary.cleared += 1;
                TransitionRequest::ClearFlag {
                    strategy_id: record.strategy_id,
                    live_fitness: score.value,
                }
            };

            match self.gate.apply(request).await? {
                AppliedTransition::RolledBack => summary.rolled_back += 1,
                AppliedTransition::Retired => summary.retired += 1,
                _ => {}
            }
        }

        self.prune_history(&tracked);

        debug!(
            examined = summary.examined,
            flagged = summary.flagged,
            rolled_back = summary.rolled_back,
            retired = summary.retired,
            skipped = summary.skipped,
            "Reconciliation pass complete"
        );
        Ok(summary)
    }

    /// Inclusive boundary: a live score exactly at the tolerance line flags.
    fn diverged(&self, record: &DeploymentRecord, live_fitness: f64) -> bool {
        live_fitness <= record.backtest_fitness * (1.0 + self.policy.divergence_threshold)
    }

    fn push_history(&mut self, strategy_id: Uuid, score: FitnessScore) {
        let window = self.history.entry(strategy_id).or_default();
        window.push_back(score);
        while window.len() > self.policy.history_len {
            window.pop_front();
        }
    }

    fn prune_history(&mut self, tracked: &[DeploymentRecord]) {
        self.history
            .retain(|id, _| tracked.iter().any(|r| r.strategy_id == *id));
    }

    /// Rolling live scores for a tracked strategy.
    pub fn live_history(&self, strategy_id: Uuid) -> Option<&VecDeque<FitnessScore>> {
        self.history.get(&strategy_id)
    }
}
