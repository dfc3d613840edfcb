//! Deployment lifecycle records.
//!
//! A `DeploymentRecord` tracks one strategy from candidacy through live
//! deployment. The record set is owned exclusively by the deployment gate:
//! the reconciler reads records and emits [`TransitionRequest`]s, and only
//! the gate applies them. This single-writer discipline is what makes the
//! lifecycle safe without external locking.

use crate::domain::genome::Genome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Paper-trading, awaiting promotion.
    Candidate,
    /// Promoted to live capital.
    Active,
    /// Removed after live underperformance. Terminal: re-entry requires a
    /// fresh candidate registration.
    RolledBack,
    /// Removed from the candidate pool before promotion. Terminal.
    Retired,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::RolledBack | DeploymentStatus::Retired)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentStatus::Candidate => write!(f, "candidate"),
            DeploymentStatus::Active => write!(f, "active"),
            DeploymentStatus::RolledBack => write!(f, "rolled_back"),
            DeploymentStatus::Retired => write!(f, "retired"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub strategy_id: Uuid,
    /// Snapshot of the genome as deployed.
    pub genome: Genome,
    pub deployed_at: DateTime<Utc>,
    pub status: DeploymentStatus,
    /// Divergence baseline: captured at candidacy, re-pinned at promotion.
    pub backtest_fitness: f64,
    pub live_fitness: Option<f64>,
    /// Consecutive reconciliation passes that flagged this strategy.
    pub underperform_streak: u32,
}

impl DeploymentRecord {
    pub fn candidate(genome: Genome, backtest_fitness: f64) -> Self {
        Self {
            strategy_id: genome.id(),
            genome,
            deployed_at: Utc::now(),
            status: DeploymentStatus::Candidate,
            backtest_fitness,
            live_fitness: None,
            underperform_streak: 0,
        }
    }
}

/// Emitted by the reconciler (or the control surface); applied only by the
/// deployment gate.
#[derive(Debug, Clone)]
pub enum TransitionRequest {
    /// Live fitness observed within tolerance of the baseline.
    ClearFlag { strategy_id: Uuid, live_fitness: f64 },
    /// Live fitness diverged below the tolerance band.
    FlagUnderperforming { strategy_id: Uuid, live_fitness: f64 },
    /// Operator-requested rollback; bypasses the streak policy.
    ManualRollback { strategy_id: Uuid },
}

impl TransitionRequest {
    pub fn strategy_id(&self) -> Uuid {
        match self {
            TransitionRequest::ClearFlag { strategy_id, .. }
            | TransitionRequest::FlagUnderperforming { strategy_id, .. }
            | TransitionRequest::ManualRollback { strategy_id } => *strategy_id,
        }
    }
}

/// What the gate did with a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedTransition {
    /// Record updated, no status change.
    Updated,
    RolledBack,
    Retired,
    /// Request did not apply (unknown strategy or terminal record).
    Ignored,
}
