//! Deterministic collaborator stand-ins.
//!
//! `SimulatedBacktester` and `SimulatedPaperVenue` let the engine run
//! end-to-end without a market-data or execution venue: metrics are derived
//! deterministically from the genome's gene values, so the same genome always
//! evaluates to the same figures and runs are reproducible. The paper venue
//! reports correlated-but-degraded figures, which exercises the divergence
//! path for some strategies.

use crate::domain::errors::BacktestError;
use crate::domain::evaluation::{EvaluationMetrics, EvaluationResult, EvaluationSource};
use crate::domain::genome::{GeneValue, Genome};
use crate::domain::ports::{Backtester, BacktestPeriod, FillSide, PaperFill, PaperTradeVenue};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

/// Fold a genome's gene values into a stable 64-bit seed.
fn genome_seed(genome: &Genome) -> u64 {
    let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
    for (name, value) in genome.genes() {
        for byte in name.bytes() {
            seed = (seed ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3);
        }
        let bits = match value {
            GeneValue::Continuous(v) => v.to_bits(),
            GeneValue::Categorical(c) => c.bytes().fold(0u64, |acc, b| {
                (acc ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
            }),
            GeneValue::TimeOfDay(m) => u64::from(*m),
        };
        seed = (seed ^ bits).wrapping_mul(0x0000_0100_0000_01b3);
    }
    seed
}

/// Deterministic unit-interval draw from a seed and salt.
fn unit(seed: u64, salt: u64) -> f64 {
    let mut x = seed ^ salt.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    (x >> 11) as f64 / (1u64 << 53) as f64
}

fn lerp(min: f64, max: f64, t: f64) -> f64 {
    min + (max - min) * t
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Synthesize plausible metrics for one genome. `degrade` scales the return
/// and Sharpe figures (1.0 for backtests, below for paper trading).
fn synthesize(seed: u64, sample_scale: f64, degrade: f64) -> EvaluationMetrics {
    EvaluationMetrics {
        total_return_pct: decimal(lerp(-15.0, 45.0, unit(seed, 1)) * degrade),
        sharpe_ratio: lerp(-0.5, 2.5, unit(seed, 2)) * degrade,
        win_rate_pct: decimal(lerp(35.0, 68.0, unit(seed, 3))),
        max_drawdown_pct: decimal(lerp(4.0, 32.0, unit(seed, 4))),
        profit_factor: lerp(0.7, 2.4, unit(seed, 5)),
        avg_holding_days: lerp(1.0, 18.0, unit(seed, 6)),
        sample_count: (lerp(35.0, 180.0, unit(seed, 7)) * sample_scale) as usize,
    }
}

/// Backtester stand-in with genome-deterministic results.
#[derive(Default)]
pub struct SimulatedBacktester;

impl SimulatedBacktester {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backtester for SimulatedBacktester {
    async fn evaluate(
        &self,
        genome: &Genome,
        universe: &[String],
        period: BacktestPeriod,
        _intervals: &[String],
    ) -> Result<EvaluationResult, BacktestError> {
        if universe.is_empty() {
            return Err(BacktestError::Unavailable {
                reason: "empty instrument universe".to_string(),
            });
        }

        Ok(EvaluationResult {
            strategy_id: genome.id(),
            source: EvaluationSource::Backtest,
            metrics: synthesize(genome_seed(genome), 1.0, 1.0),
            period_start: period.start,
            period_end: period.end,
            failure: None,
        })
    }
}

/// Paper venue stand-in. Deployed genomes report degraded backtest figures;
/// the degradation factor is itself genome-deterministic, so a slice of
/// strategies genuinely diverges.
pub struct SimulatedPaperVenue {
    deployed: RwLock<HashMap<Uuid, Genome>>,
}

impl SimulatedPaperVenue {
    pub fn new() -> Self {
        Self {
            deployed: RwLock::new(HashMap::new()),
        }
    }

    pub async fn deployed_count(&self) -> usize {
        self.deployed.read().await.len()
    }
}

impl Default for SimulatedPaperVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaperTradeVenue for SimulatedPaperVenue {
    async fn execute(&self, genome: &Genome) -> Result<Receiver<PaperFill>> {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let seed = genome_seed(genome);
        let strategy_id = genome.id();

        // A handful of synthetic fills; the stream closes afterwards.
        for i in 0..3u64 {
            let fill = PaperFill {
                strategy_id,
                symbol: "AAPL".to_string(),
                side: if i % 2 == 0 { FillSide::Buy } else { FillSide::Sell },
                quantity: decimal(lerp(1.0, 20.0, unit(seed, 100 + i))),
                price: decimal(lerp(80.0, 240.0, unit(seed, 200 + i))),
                timestamp: Utc::now(),
            };
            let _ = tx.send(fill).await;
        }

        self.deployed.write().await.insert(strategy_id, genome.clone());
        Ok(rx)
    }

    async fn metrics(&self, strategy_id: Uuid, window: Duration) -> Result<EvaluationResult> {
        let deployed = self.deployed.read().await;
        let Some(genome) = deployed.get(&strategy_id) else {
            bail!("strategy {strategy_id} is not paper-trading");
        };

        let seed = genome_seed(genome);
        // Degradation spans 0.55..1.05 of backtest performance.
        let degrade = lerp(0.55, 1.05, unit(seed, 11));
        let now = Utc::now();

        Ok(EvaluationResult {
            strategy_id,
            source: EvaluationSource::Paper,
            metrics: synthesize(seed, 0.3, degrade),
            period_start: now - window,
            period_end: now,
            failure: None,
        })
    }

    async fn withdraw(&self, strategy_id: Uuid) -> Result<()> {
        self.deployed.write().await.remove(&strategy_id);
        Ok(())
    }
}
