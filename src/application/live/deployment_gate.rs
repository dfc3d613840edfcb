//! Deployment safety gate.
//!
//! The gate is the single writer over the deployment record set. Promotion
//! applies the safety policy atomically against a draft record; the first
//! failing precondition is reported as a structured rejection, never an
//! error. Rollback happens only when the reconciler's underperformance
//! streak reaches the removal threshold on an active record, or on an
//! operator's manual request. Rolled-back and retired records are terminal.

use crate::domain::deployment::{
    AppliedTransition, DeploymentRecord, DeploymentStatus, TransitionRequest,
};
use crate::domain::errors::StorageError;
use crate::domain::fitness::FitnessScore;
use crate::domain::genome::Genome;
use crate::domain::ports::GenerationStore;
use chrono::{Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Promotion preconditions and the rollback threshold.
#[derive(Debug, Clone, Copy)]
pub struct PromotionPolicy {
    pub min_backtest_window: Duration,
    pub min_sample_count: usize,
    pub min_win_rate_pct: f64,
    /// Consecutive underperforming passes before an active record rolls back
    /// (or a candidate retires).
    pub removal_flag_count: u32,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            min_backtest_window: Duration::days(90),
            min_sample_count: 30,
            min_win_rate_pct: 45.0,
            removal_flag_count: 2,
        }
    }
}

/// Why a candidate was refused promotion. A policy outcome, not an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeploymentRejection {
    #[error("Backtest window {actual_days}d below minimum {required_days}d")]
    MinWindow { actual_days: i64, required_days: i64 },

    #[error("Sample count {actual} below minimum {required}")]
    MinSampleCount { actual: usize, required: usize },

    #[error("Win rate {actual:.2}% below minimum {required:.2}%")]
    MinWinRate { actual: f64, required: f64 },

    #[error("Strategy is flagged underperforming ({streak} consecutive passes)")]
    Underperforming { streak: u32 },

    #[error("Strategy is not registered as a candidate")]
    NotACandidate,

    #[error("Strategy is terminally {status}; re-enter as a fresh candidate")]
    AlreadyTerminal { status: DeploymentStatus },
}

#[derive(Debug, Clone)]
pub enum PromotionOutcome {
    Promoted(DeploymentRecord),
    Rejected(DeploymentRejection),
}

pub struct DeploymentGate {
    records: RwLock<HashMap<Uuid, DeploymentRecord>>,
    policy: PromotionPolicy,
    store: Arc<dyn GenerationStore>,
}

impl DeploymentGate {
    pub fn new(policy: PromotionPolicy, store: Arc<dyn GenerationStore>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            policy,
            store,
        }
    }

    pub fn policy(&self) -> &PromotionPolicy {
        &self.policy
    }

    /// Register a genome as a deployment candidate. Existing non-terminal
    /// records refresh their divergence baseline; terminal records stay
    /// untouched — a rolled-back strategy re-enters only as a fresh genome.
    pub async fn register_candidate(
        &self,
        genome: &Genome,
        backtest: &FitnessScore,
    ) -> Result<DeploymentRecord, StorageError> {
        let snapshot = {
            let mut records = self.records.write().await;
            match records.get_mut(&genome.id()) {
                Some(existing) if existing.status.is_terminal() => {
                    warn!(
                        strategy_id = %genome.id(),
                        status = %existing.status,
                        "Refusing to resurrect a terminal deployment record"
                    );
                    return Ok(existing.clone());
                }
                Some(existing) => {
                    existing.backtest_fitness = backtest.value;
                    existing.clone()
                }
                None => {
                    let record = DeploymentRecord::candidate(genome.clone(), backtest.value);
                    records.insert(record.strategy_id, record.clone());
                    info!(
                        strategy_id = %record.strategy_id,
                        fitness = record.backtest_fitness,
                        "Registered deployment candidate"
                    );
                    record
                }
            }
        };

        self.store.persist_deployment(&snapshot).await?;
        Ok(snapshot)
    }

    /// Attempt promotion of a candidate to live capital. Preconditions are
    /// checked in a fixed order against the draft record and the supplied
    /// backtest evaluation; the first failure names the rejection.
    pub async fn promote(
        &self,
        strategy_id: Uuid,
        evaluation: &FitnessScore,
    ) -> Result<PromotionOutcome, StorageError> {
        let snapshot = {
            let mut records = self.records.write().await;
            let Some(record) = records.get_mut(&strategy_id) else {
                return Ok(PromotionOutcome::Rejected(DeploymentRejection::NotACandidate));
            };

            if record.status.is_terminal() {
                return Ok(PromotionOutcome::Rejected(
                    DeploymentRejection::AlreadyTerminal {
                        status: record.status,
                    },
                ));
            }
            if record.status == DeploymentStatus::Active {
                return Ok(PromotionOutcome::Promoted(record.clone()));
            }

            if let Some(rejection) = self.first_failing_precondition(record, evaluation) {
                return Ok(PromotionOutcome::Rejected(rejection));
            }

            record.status = DeploymentStatus::Active;
            record.deployed_at = Utc::now();
            record.backtest_fitness = evaluation.value;
            record.clone()
        };

        self.store.persist_deployment(&snapshot).await?;
        info!(
            strategy_id = %snapshot.strategy_id,
            fitness = snapshot.backtest_fitness,
            "Strategy promoted to active deployment"
        );
        Ok(PromotionOutcome::Promoted(snapshot))
    }

    fn first_failing_precondition(
        &self,
        record: &DeploymentRecord,
        evaluation: &FitnessScore,
    ) -> Option<DeploymentRejection> {
        let window = evaluation.result.window();
        if window < self.policy.min_backtest_window {
            return Some(DeploymentRejection::MinWindow {
                actual_days: window.num_days(),
                required_days: self.policy.min_backtest_window.num_days(),
            });
        }

        let samples = evaluation.result.metrics.sample_count;
        if samples < self.policy.min_sample_count {
            return Some(DeploymentRejection::MinSampleCount {
                actual: samples,
                required: self.policy.min_sample_count,
            });
        }

        let win_rate = evaluation
            .result
            .metrics
            .win_rate_pct
            .to_f64()
            .unwrap_or(0.0);
        if win_rate < self.policy.min_win_rate_pct {
            return Some(DeploymentRejection::MinWinRate {
                actual: win_rate,
                required: self.policy.min_win_rate_pct,
            });
        }

        if record.underperform_streak > 0 {
            return Some(DeploymentRejection::Underperforming {
                streak: record.underperform_streak,
            });
        }

        None
    }

    /// Apply a transition request atomically. The only mutation path besides
    /// registration and promotion.
    pub async fn apply(
        &self,
        request: TransitionRequest,
    ) -> Result<AppliedTransition, StorageError> {
        let strategy_id = request.strategy_id();

        let (applied, snapshot) = {
            let mut records = self.records.write().await;
            let Some(record) = records.get_mut(&strategy_id) else {
                return Ok(AppliedTransition::Ignored);
            };
            if record.status.is_terminal() {
                return Ok(AppliedTransition::Ignored);
            }

            let applied = match request {
                TransitionRequest::ClearFlag { live_fitness, .. } => {
                    record.live_fitness = Some(live_fitness);
                    record.underperform_streak = 0;
                    AppliedTransition::Updated
                }
                TransitionRequest::FlagUnderperforming { live_fitness, .. } => {
                    record.live_fitness = Some(live_fitness);
                    record.underperform_streak += 1;
                    if record.underperform_streak >= self.policy.removal_flag_count {
                        self.remove(record)
                    } else {
                        AppliedTransition::Updated
                    }
                }
                TransitionRequest::ManualRollback { .. } => self.remove(record),
            };

            (applied, record.clone())
        };

        self.store.persist_deployment(&snapshot).await?;

        match applied {
            AppliedTransition::RolledBack => {
                warn!(strategy_id = %strategy_id, "Strategy rolled back from live deployment");
            }
            AppliedTransition::Retired => {
                info!(strategy_id = %strategy_id, "Candidate retired from the pool");
            }
            _ => {}
        }

        Ok(applied)
    }

    fn remove(&self, record: &mut DeploymentRecord) -> AppliedTransition {
        match record.status {
            DeploymentStatus::Active => {
                record.status = DeploymentStatus::RolledBack;
                AppliedTransition::RolledBack
            }
            DeploymentStatus::Candidate => {
                record.status = DeploymentStatus::Retired;
                AppliedTransition::Retired
            }
            _ => AppliedTransition::Ignored,
        }
    }

    pub async fn record(&self, strategy_id: Uuid) -> Option<DeploymentRecord> {
        self.records.read().await.get(&strategy_id).cloned()
    }

    pub async fn records(&self) -> Vec<DeploymentRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Records under live paper-trading: candidates and actives.
    pub async fn tracked(&self) -> Vec<DeploymentRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::{EvaluationMetrics, EvaluationResult, EvaluationSource};
    use crate::domain::generation::Generation;
    use crate::domain::genome::GeneSchema;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct NullStore;

    #[async_trait]
    impl GenerationStore for NullStore {
        async fn persist_generation(&self, _generation: &Generation) -> Result<(), StorageError> {
            Ok(())
        }

        async fn persist_deployment(&self, _record: &DeploymentRecord) -> Result<(), StorageError> {
            Ok(())
        }

        async fn query_recent(&self, _n: usize) -> Result<Vec<Generation>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn genome() -> Genome {
        let schema = GeneSchema::momentum_v1();
        let mut rng = StdRng::seed_from_u64(77);
        schema.sample_random(0, &mut rng)
    }

    fn backtest_score(
        strategy_id: Uuid,
        value: f64,
        window_days: i64,
        samples: usize,
        win_rate: Decimal,
    ) -> FitnessScore {
        let now = Utc::now();
        FitnessScore {
            strategy_id,
            value,
            source: EvaluationSource::Backtest,
            insufficient_data: samples == 0,
            result: EvaluationResult {
                strategy_id,
                source: EvaluationSource::Backtest,
                metrics: EvaluationMetrics {
                    win_rate_pct: win_rate,
                    sample_count: samples,
                    ..EvaluationMetrics::empty()
                },
                period_start: now - Duration::days(window_days),
                period_end: now,
                failure: None,
            },
        }
    }

    fn gate() -> DeploymentGate {
        DeploymentGate::new(PromotionPolicy::default(), Arc::new(NullStore))
    }

    async fn registered_candidate(gate: &DeploymentGate) -> (Uuid, FitnessScore) {
        let genome = genome();
        let score = backtest_score(genome.id(), 80.0, 180, 60, dec!(55.0));
        gate.register_candidate(&genome, &score).await.unwrap();
        (genome.id(), score)
    }

    #[tokio::test]
    async fn test_promotion_happy_path() {
        let gate = gate();
        let (id, score) = registered_candidate(&gate).await;

        let outcome = gate.promote(id, &score).await.unwrap();
        let PromotionOutcome::Promoted(record) = outcome else {
            panic!("expected promotion");
        };
        assert_eq!(record.status, DeploymentStatus::Active);
        assert_eq!(record.backtest_fitness, 80.0);
    }

    #[tokio::test]
    async fn test_short_window_rejects_with_min_window_regardless_of_fitness() {
        let gate = gate();
        let (id, _) = registered_candidate(&gate).await;

        // Perfect fitness and samples, but only 30 days of backtest.
        let score = backtest_score(id, 99.0, 30, 500, dec!(70.0));
        let outcome = gate.promote(id, &score).await.unwrap();

        assert!(matches!(
            outcome,
            PromotionOutcome::Rejected(DeploymentRejection::MinWindow {
                actual_days: 30,
                required_days: 90
            })
        ));
    }

    #[tokio::test]
    async fn test_precondition_order_window_then_samples_then_win_rate() {
        let gate = gate();
        let (id, _) = registered_candidate(&gate).await;

        // Window and samples both bad: window is named first.
        let score = backtest_score(id, 80.0, 10, 1, dec!(10.0));
        let outcome = gate.promote(id, &score).await.unwrap();
        assert!(matches!(
            outcome,
            PromotionOutcome::Rejected(DeploymentRejection::MinWindow { .. })
        ));

        // Window fine, samples bad.
        let score = backtest_score(id, 80.0, 180, 5, dec!(10.0));
        let outcome = gate.promote(id, &score).await.unwrap();
        assert!(matches!(
            outcome,
            PromotionOutcome::Rejected(DeploymentRejection::MinSampleCount { actual: 5, .. })
        ));

        // Window and samples fine, win rate bad.
        let score = backtest_score(id, 80.0, 180, 60, dec!(30.0));
        let outcome = gate.promote(id, &score).await.unwrap();
        assert!(matches!(
            outcome,
            PromotionOutcome::Rejected(DeploymentRejection::MinWinRate { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_sample_evaluation_never_promotes() {
        let gate = gate();
        let (id, _) = registered_candidate(&gate).await;

        let score = backtest_score(id, 0.0, 180, 0, dec!(0.0));
        let outcome = gate.promote(id, &score).await.unwrap();
        assert!(matches!(
            outcome,
            PromotionOutcome::Rejected(DeploymentRejection::MinSampleCount { actual: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_flagged_candidate_is_rejected() {
        let gate = gate();
        let (id, score) = registered_candidate(&gate).await;

        gate.apply(TransitionRequest::FlagUnderperforming {
            strategy_id: id,
            live_fitness: 20.0,
        })
        .await
        .unwrap();

        let outcome = gate.promote(id, &score).await.unwrap();
        assert!(matches!(
            outcome,
            PromotionOutcome::Rejected(DeploymentRejection::Underperforming { streak: 1 })
        ));
    }

    #[tokio::test]
    async fn test_unregistered_strategy_is_not_a_candidate() {
        let gate = gate();
        let score = backtest_score(Uuid::new_v4(), 80.0, 180, 60, dec!(55.0));

        let outcome = gate.promote(score.strategy_id, &score).await.unwrap();
        assert!(matches!(
            outcome,
            PromotionOutcome::Rejected(DeploymentRejection::NotACandidate)
        ));
    }

    #[tokio::test]
    async fn test_streak_reaching_threshold_rolls_back_active() {
        let gate = gate();
        let (id, score) = registered_candidate(&gate).await;
        gate.promote(id, &score).await.unwrap();

        let applied = gate
            .apply(TransitionRequest::FlagUnderperforming {
                strategy_id: id,
                live_fitness: 30.0,
            })
            .await
            .unwrap();
        assert_eq!(applied, AppliedTransition::Updated);

        let applied = gate
            .apply(TransitionRequest::FlagUnderperforming {
                strategy_id: id,
                live_fitness: 28.0,
            })
            .await
            .unwrap();
        assert_eq!(applied, AppliedTransition::RolledBack);

        let record = gate.record(id).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::RolledBack);
        assert_eq!(record.live_fitness, Some(28.0));
    }

    #[tokio::test]
    async fn test_clear_flag_resets_the_streak() {
        let gate = gate();
        let (id, score) = registered_candidate(&gate).await;
        gate.promote(id, &score).await.unwrap();

        gate.apply(TransitionRequest::FlagUnderperforming {
            strategy_id: id,
            live_fitness: 30.0,
        })
        .await
        .unwrap();
        gate.apply(TransitionRequest::ClearFlag {
            strategy_id: id,
            live_fitness: 75.0,
        })
        .await
        .unwrap();
        let applied = gate
            .apply(TransitionRequest::FlagUnderperforming {
                strategy_id: id,
                live_fitness: 30.0,
            })
            .await
            .unwrap();

        // Non-consecutive flags never reach the removal threshold.
        assert_eq!(applied, AppliedTransition::Updated);
        let record = gate.record(id).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Active);
        assert_eq!(record.underperform_streak, 1);
    }

    #[tokio::test]
    async fn test_candidate_at_threshold_retires() {
        let gate = gate();
        let (id, _) = registered_candidate(&gate).await;

        for _ in 0..2 {
            gate.apply(TransitionRequest::FlagUnderperforming {
                strategy_id: id,
                live_fitness: 10.0,
            })
            .await
            .unwrap();
        }

        let record = gate.record(id).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Retired);
    }

    #[tokio::test]
    async fn test_rolled_back_is_terminal() {
        let gate = gate();
        let (id, score) = registered_candidate(&gate).await;
        gate.promote(id, &score).await.unwrap();
        gate.apply(TransitionRequest::ManualRollback { strategy_id: id })
            .await
            .unwrap();

        // Further transitions are ignored.
        let applied = gate
            .apply(TransitionRequest::ClearFlag {
                strategy_id: id,
                live_fitness: 90.0,
            })
            .await
            .unwrap();
        assert_eq!(applied, AppliedTransition::Ignored);

        // Promotion is refused.
        let outcome = gate.promote(id, &score).await.unwrap();
        assert!(matches!(
            outcome,
            PromotionOutcome::Rejected(DeploymentRejection::AlreadyTerminal {
                status: DeploymentStatus::RolledBack
            })
        ));

        // And the record is excluded from the tracked set.
        assert!(gate.tracked().await.is_empty());
    }

    #[tokio::test]
    async fn test_manual_rollback_of_unknown_strategy_is_ignored() {
        let gate = gate();
        let applied = gate
            .apply(TransitionRequest::ManualRollback {
                strategy_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        assert_eq!(applied, AppliedTransition::Ignored);
    }
}
