//! Bounded-concurrency evaluation fan-out.
//!
//! Submits every genome of a generation to the backtest collaborator through
//! a semaphore-bounded task set, with a per-task timeout. A failed, timed-out,
//! or panicked evaluation becomes a failure-marked result — one poisoned
//! genome never blocks the cycle, and the dispatcher always returns exactly
//! one result per submitted genome. Evaluation order is not guaranteed.

use crate::domain::evaluation::{EvaluationResult, EvaluationSource};
use crate::domain::genome::Genome;
use crate::domain::ports::{Backtester, BacktestPeriod};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, warn};
use uuid::Uuid;

/// What to evaluate a genome against.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub universe: Vec<String>,
    pub period: BacktestPeriod,
    pub intervals: Vec<String>,
}

/// Worker-pool sizing and per-task timeout.
#[derive(Debug, Clone, Copy)]
pub struct DispatchLimits {
    pub concurrency: usize,
    pub task_timeout: Duration,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            concurrency: 8,
            task_timeout: Duration::from_secs(120),
        }
    }
}

pub struct EvaluationDispatcher {
    backtester: Arc<dyn Backtester>,
    limits: DispatchLimits,
}

impl EvaluationDispatcher {
    pub fn new(backtester: Arc<dyn Backtester>, limits: DispatchLimits) -> Self {
        let limits = DispatchLimits {
            concurrency: limits.concurrency.max(1),
            task_timeout: limits.task_timeout,
        };
        Self { backtester, limits }
    }

    /// Evaluate a population. The returned vector aligns with the input
    /// order and carries exactly one result per genome.
    pub async fn dispatch(
        &self,
        population: &[Genome],
        request: &EvaluationRequest,
    ) -> Vec<EvaluationResult> {
        let semaphore = Arc::new(Semaphore::new(self.limits.concurrency));
        let mut tasks: JoinSet<(Uuid, EvaluationResult)> = JoinSet::new();

        for genome in population {
            let genome = genome.clone();
            let backtester = self.backtester.clone();
            let request = request.clone();
            let semaphore = semaphore.clone();
            let task_timeout = self.limits.task_timeout;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let id = genome.id();
                let result = evaluate_one(&*backtester, &genome, &request, task_timeout).await;
                (id, result)
            });
        }

        let mut by_id: HashMap<Uuid, EvaluationResult> = HashMap::with_capacity(population.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, result)) => {
                    by_id.insert(id, result);
                }
                Err(e) => {
                    // Back-filled below from the submission list.
                    error!("Evaluation task aborted before producing a result: {e}");
                }
            }
        }

        population
            .iter()
            .map(|genome| {
                by_id.remove(&genome.id()).unwrap_or_else(|| {
                    EvaluationResult::failed(
                        genome.id(),
                        EvaluationSource::Backtest,
                        request.period.start,
                        request.period.end,
                        "evaluation task aborted",
                    )
                })
            })
            .collect()
    }
}

async fn evaluate_one(
    backtester: &dyn Backtester,
    genome: &Genome,
    request: &EvaluationRequest,
    task_timeout: Duration,
) -> EvaluationResult {
    let id = genome.id();
    let outcome = timeout(
        task_timeout,
        backtester.evaluate(genome, &request.universe, request.period, &request.intervals),
    )
    .await;

    match outcome {
        Ok(Ok(result)) => {
            if result.strategy_id != id {
                warn!(
                    strategy_id = %id,
                    returned_id = %result.strategy_id,
                    "Backtester returned a result for the wrong strategy"
                );
                return EvaluationResult::failed(
                    id,
                    EvaluationSource::Backtest,
                    request.period.start,
                    request.period.end,
                    "malformed result: strategy id mismatch",
                );
            }
            result
        }
        Ok(Err(e)) => {
            warn!(strategy_id = %id, "Evaluation failed: {e}");
            EvaluationResult::failed(
                id,
                EvaluationSource::Backtest,
                request.period.start,
                request.period.end,
                e.to_string(),
            )
        }
        Err(_) => {
            warn!(strategy_id = %id, "Evaluation timed out after {task_timeout:?}");
            EvaluationResult::failed(
                id,
                EvaluationSource::Backtest,
                request.period.start,
                request.period.end,
                format!("evaluation timed out after {task_timeout:?}"),
            )
        }
    }
}
