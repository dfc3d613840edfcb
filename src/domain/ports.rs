//! Collaborator contracts at the core boundary.
//!
//! Implementations live outside the optimization core: a real backtest
//! engine, a brokerage paper-trading venue, a durable store. The core only
//! depends on these traits; `infrastructure` ships simulated and in-memory
//! implementations for mock mode and tests.

use crate::domain::deployment::DeploymentRecord;
use crate::domain::errors::{BacktestError, StorageError};
use crate::domain::evaluation::EvaluationResult;
use crate::domain::generation::Generation;
use crate::domain::genome::Genome;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

/// Historical period a backtest replays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BacktestPeriod {
    /// Trailing period ending now.
    pub fn lookback(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillSide {
    Buy,
    Sell,
}

/// One paper-trade fill reported on the venue stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperFill {
    pub strategy_id: Uuid,
    pub symbol: String,
    pub side: FillSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Replays price history against a strategy's rules.
#[async_trait]
pub trait Backtester: Send + Sync {
    /// Evaluate one genome over the given universe and period.
    ///
    /// `BacktestError::Unavailable` means the data or execution venue cannot
    /// respond; the dispatcher converts it into a failure-marked result.
    async fn evaluate(
        &self,
        genome: &Genome,
        universe: &[String],
        period: BacktestPeriod,
        intervals: &[String],
    ) -> Result<EvaluationResult, BacktestError>;
}

/// Paper-trading execution venue.
#[async_trait]
pub trait PaperTradeVenue: Send + Sync {
    /// Start paper-trading the genome. Fills arrive on the returned stream
    /// until the strategy is withdrawn or the venue shuts down.
    async fn execute(&self, genome: &Genome) -> Result<Receiver<PaperFill>>;

    /// Aggregated paper metrics for the strategy over the trailing window.
    async fn metrics(&self, strategy_id: Uuid, window: Duration) -> Result<EvaluationResult>;

    /// Stop paper-trading the strategy.
    async fn withdraw(&self, strategy_id: Uuid) -> Result<()>;
}

/// Append-mostly persistence for sealed generations and deployment
/// transitions. The core never updates a sealed generation in place.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn persist_generation(&self, generation: &Generation) -> Result<(), StorageError>;

    /// Append one deployment record transition.
    async fn persist_deployment(&self, record: &DeploymentRecord) -> Result<(), StorageError>;

    /// Most recent sealed generations, newest first.
    async fn query_recent(&self, n: usize) -> Result<Vec<Generation>, StorageError>;
}
