//! Top-level optimization loop.
//!
//! The supervisor drives discrete cycles on a fixed interval: one full
//! generation cycle, candidate registration and promotion through the gate,
//! then one reconciliation pass. The dispatcher fan-out inside the cycle is
//! the only parallel region. Shutdown is cooperative: commands are serviced
//! while sleeping, the in-flight cycle always completes through persistence
//! (evaluations finish or time out), and the loop exits cleanly afterward.
//! A storage failure is fatal and stops the loop with an error.

use crate::application::evaluation::dispatcher::EvaluationRequest;
use crate::application::evolution::generation_manager::GenerationManager;
use crate::application::live::deployment_gate::{DeploymentGate, PromotionOutcome};
use crate::application::live::reconciler::LiveFeedbackReconciler;
use crate::domain::deployment::{DeploymentStatus, TransitionRequest};
use crate::domain::generation::Generation;
use crate::domain::ports::{BacktestPeriod, PaperTradeVenue};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Control-surface commands.
#[derive(Debug)]
pub enum SupervisorCommand {
    Status(oneshot::Sender<SupervisorStatus>),
    ManualRollback {
        strategy_id: Uuid,
        respond_to: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// One deployment line in the status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentLine {
    pub strategy_id: Uuid,
    pub status: DeploymentStatus,
    pub backtest_fitness: f64,
    pub live_fitness: Option<f64>,
}

/// Published after every cycle for the control surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SupervisorStatus {
    pub generation: Option<u64>,
    pub best_score: Option<f64>,
    pub best_strategy: Option<Uuid>,
    pub cycles_completed: u64,
    pub deployments: Vec<DeploymentLine>,
}

/// Loop cadence and evaluation request shape.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub cycle_interval: Duration,
    pub max_generations: Option<u64>,
    pub universe: Vec<String>,
    pub backtest_lookback_days: i64,
    pub intervals: Vec<String>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(600),
            max_generations: None,
            universe: vec!["AAPL".to_string()],
            backtest_lookback_days: 180,
            intervals: vec!["1d".to_string()],
        }
    }
}

/// Cloneable handle to a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    cmd_tx: mpsc::Sender<SupervisorCommand>,
    status: Arc<RwLock<SupervisorStatus>>,
}

impl SupervisorHandle {
    /// Latest published status snapshot.
    pub async fn status(&self) -> SupervisorStatus {
        self.status.read().await.clone()
    }

    /// Request a graceful stop. The current cycle completes first.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SupervisorCommand::Shutdown).await;
    }

    /// Request a manual rollback; resolves true when the gate applied it.
    pub async fn request_rollback(&self, strategy_id: Uuid) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SupervisorCommand::ManualRollback {
                strategy_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

pub struct OptimizationSupervisor {
    manager: GenerationManager,
    reconciler: LiveFeedbackReconciler,
    gate: Arc<DeploymentGate>,
    venue: Arc<dyn PaperTradeVenue>,
    settings: SupervisorSettings,
    cmd_rx: mpsc::Receiver<SupervisorCommand>,
    status: Arc<RwLock<SupervisorStatus>>,
    cycles_completed: u64,
    /// Strategies with a live paper stream, for withdrawal on removal.
    paper_live: HashSet<Uuid>,
}

impl OptimizationSupervisor {
    pub fn new(
        manager: GenerationManager,
        reconciler: LiveFeedbackReconciler,
        gate: Arc<DeploymentGate>,
        venue: Arc<dyn PaperTradeVenue>,
        settings: SupervisorSettings,
    ) -> (Self, SupervisorHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let status = Arc::new(RwLock::new(SupervisorStatus::default()));

        let handle = SupervisorHandle {
            cmd_tx,
            status: status.clone(),
        };

        let supervisor = Self {
            manager,
            reconciler,
            gate,
            venue,
            settings,
            cmd_rx,
            status,
            cycles_completed: 0,
            paper_live: HashSet::new(),
        };

        (supervisor, handle)
    }

    /// Run until shutdown, max generations, or a fatal storage failure.
    pub async fn run(mut self) -> Result<()> {
        info!(
            interval_secs = self.settings.cycle_interval.as_secs(),
            max_generations = ?self.settings.max_generations,
            "Optimization supervisor starting"
        );

        let mut ticker = tokio::time::interval(self.settings.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                cmd = self.cmd_rx.recv() => {
                    if self.handle_command(cmd).await {
                        break;
                    }
                    continue;
                }
            }

            self.run_once()
                .await
                .context("Fatal cycle failure, halting supervisor")?;
            self.cycles_completed += 1;

            if let Some(max) = self.settings.max_generations {
                if self.cycles_completed >= max {
                    info!(max_generations = max, "Generation bound reached");
                    break;
                }
            }
        }

        info!(
            cycles = self.cycles_completed,
            "Optimization supervisor stopped"
        );
        Ok(())
    }

    /// One full tick: generation cycle, candidate management, reconciliation.
    async fn run_once(&mut self) -> Result<()> {
        let request = EvaluationRequest {
            universe: self.settings.universe.clone(),
            period: BacktestPeriod::lookback(self.settings.backtest_lookback_days),
            intervals: self.settings.intervals.clone(),
        };

        let generation = self.manager.run_cycle(&request).await?;

        self.register_best_candidate(&generation).await?;
        self.promote_eligible(&generation).await?;

        let summary = self.reconciler.run_pass().await?;
        if summary.rolled_back + summary.retired > 0 {
            self.withdraw_removed().await;
        }

        self.publish_status(&generation).await;
        Ok(())
    }

    /// Register the cycle's best genome as a deployment candidate and start
    /// its paper-trade stream.
    async fn register_best_candidate(&mut self, generation: &Generation) -> Result<()> {
        let Some(best) = generation.best() else {
            return Ok(());
        };
        if best.score.insufficient_data {
            debug!(
                generation = generation.number(),
                "Best member has insufficient data, no candidate registered"
            );
            return Ok(());
        }
        if self.gate.record(best.genome.id()).await.is_some() {
            return Ok(());
        }

        self.gate.register_candidate(&best.genome, &best.score).await?;

        match self.venue.execute(&best.genome).await {
            Ok(mut fills) => {
                self.paper_live.insert(best.genome.id());
                let strategy_id = best.genome.id();
                tokio::spawn(async move {
                    while let Some(fill) = fills.recv().await {
                        debug!(
                            strategy_id = %strategy_id,
                            symbol = %fill.symbol,
                            side = ?fill.side,
                            price = %fill.price,
                            "Paper fill"
                        );
                    }
                });
            }
            Err(e) => {
                warn!(
                    strategy_id = %best.genome.id(),
                    "Paper venue refused execution: {e}"
                );
            }
        }

        Ok(())
    }

    /// Attempt promotion for every candidate re-evaluated in this cohort.
    async fn promote_eligible(&mut self, generation: &Generation) -> Result<()> {
        for member in generation.members() {
            let id = member.genome.id();
            let Some(record) = self.gate.record(id).await else {
                continue;
            };
            if record.status != DeploymentStatus::Candidate {
                continue;
            }

            match self.gate.promote(id, &member.score).await? {
                PromotionOutcome::Promoted(_) => {}
                PromotionOutcome::Rejected(rejection) => {
                    debug!(strategy_id = %id, "Promotion rejected: {rejection}");
                }
            }
        }
        Ok(())
    }

    /// Stop paper-trading strategies the gate has removed.
    async fn withdraw_removed(&mut self) {
        let records = self.gate.records().await;
        for record in records {
            if record.status.is_terminal() && self.paper_live.remove(&record.strategy_id) {
                if let Err(e) = self.venue.withdraw(record.strategy_id).await {
                    warn!(
                        strategy_id = %record.strategy_id,
                        "Failed to withdraw paper strategy: {e}"
                    );
                }
            }
        }
    }

    async fn publish_status(&self, generation: &Generation) {
        let deployments = self
            .gate
            .records()
            .await
            .into_iter()
            .map(|r| DeploymentLine {
                strategy_id: r.strategy_id,
                status: r.status,
                backtest_fitness: r.backtest_fitness,
                live_fitness: r.live_fitness,
            })
            .collect();

        let mut status = self.status.write().await;
        *status = SupervisorStatus {
            generation: Some(generation.number()),
            best_score: generation.best().map(|m| m.score.value),
            best_strategy: generation.best().map(|m| m.genome.id()),
            cycles_completed: self.cycles_completed + 1,
            deployments,
        };
    }

    /// Returns true when the loop should stop.
    async fn handle_command(&mut self, cmd: Option<SupervisorCommand>) -> bool {
        match cmd {
            None => {
                info!("Control channel closed, stopping supervisor");
                true
            }
            Some(SupervisorCommand::Shutdown) => {
                info!("Shutdown command received");
                true
            }
            Some(SupervisorCommand::Status(respond_to)) => {
                let _ = respond_to.send(self.status.read().await.clone());
                false
            }
            Some(SupervisorCommand::ManualRollback {
                strategy_id,
                respond_to,
            }) => {
                let applied = match self
                    .gate
                    .apply(TransitionRequest::ManualRollback { strategy_id })
                    .await
                {
                    Ok(applied) => {
                        use crate::domain::deployment::AppliedTransition;
                        matches!(
                            applied,
                            AppliedTransition::RolledBack | AppliedTransition::Retired
                        )
                    }
                    Err(e) => {
                        error!("Manual rollback failed to persist: {e}");
                        false
                    }
                };
                if applied {
                    self.withdraw_removed().await;
                }
                let _ = respond_to.send(applied);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::evaluation::dispatcher::{DispatchLimits, EvaluationDispatcher};
    use crate::application::evolution::generation_manager::EvolutionParams;
    use crate::application::live::deployment_gate::PromotionPolicy;
    use crate::application::live::reconciler::ReconcilePolicy;
    use crate::domain::fitness::{FitnessCalibration, FitnessEvaluator};
    use crate::domain::genome::GeneSchema;
    use crate::infrastructure::mock::{SimulatedBacktester, SimulatedPaperVenue};
    use crate::infrastructure::repositories::in_memory::InMemoryGenerationStore;

    fn build(
        max_generations: Option<u64>,
    ) -> (
        OptimizationSupervisor,
        SupervisorHandle,
        Arc<InMemoryGenerationStore>,
        Arc<DeploymentGate>,
    ) {
        let store = Arc::new(InMemoryGenerationStore::new());
        let backtester = Arc::new(SimulatedBacktester::new());
        let venue = Arc::new(SimulatedPaperVenue::new());
        let evaluator = FitnessEvaluator::new(FitnessCalibration::default()).unwrap();

        let manager = GenerationManager::new(
            GeneSchema::momentum_v1(),
            EvolutionParams {
                population_size: 6,
                ..EvolutionParams::default()
            },
            evaluator.clone(),
            EvaluationDispatcher::new(backtester, DispatchLimits::default()),
            store.clone(),
            Some(2024),
        );

        let gate = Arc::new(DeploymentGate::new(
            PromotionPolicy::default(),
            store.clone(),
        ));
        let reconciler = LiveFeedbackReconciler::new(
            venue.clone(),
            gate.clone(),
            evaluator,
            ReconcilePolicy::default(),
        );

        let settings = SupervisorSettings {
            cycle_interval: Duration::from_millis(10),
            max_generations,
            ..SupervisorSettings::default()
        };

        let (supervisor, handle) =
            OptimizationSupervisor::new(manager, reconciler, gate.clone(), venue, settings);
        (supervisor, handle, store, gate)
    }

    #[tokio::test]
    async fn test_bounded_run_seals_every_generation() {
        let (supervisor, handle, store, _gate) = build(Some(3));

        supervisor.run().await.unwrap();

        assert_eq!(store.generation_count().await, 3);
        let status = handle.status().await;
        assert_eq!(status.cycles_completed, 3);
        assert_eq!(status.generation, Some(2));
        assert!(status.best_score.is_some());
    }

    #[tokio::test]
    async fn test_best_strategy_becomes_a_tracked_candidate() {
        let (supervisor, handle, _store, gate) = build(Some(2));

        supervisor.run().await.unwrap();

        let records = gate.records().await;
        assert!(!records.is_empty());
        let status = handle.status().await;
        assert_eq!(status.deployments.len(), records.len());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_between_cycles() {
        let (supervisor, handle, store, _gate) = build(None);

        let runner = tokio::spawn(supervisor.run());

        // Let at least one cycle land, then stop.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        runner.await.unwrap().unwrap();
        assert!(store.generation_count().await >= 1);
    }

    /// Paper venue without enough live samples to ever flag a strategy, so
    /// removal can only come from the control surface.
    struct QuietVenue;

    #[async_trait::async_trait]
    impl PaperTradeVenue for QuietVenue {
        async fn execute(
            &self,
            _genome: &crate::domain::genome::Genome,
        ) -> Result<tokio::sync::mpsc::Receiver<crate::domain::ports::PaperFill>> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(rx)
        }

        async fn metrics(
            &self,
            strategy_id: Uuid,
            window: chrono::Duration,
        ) -> Result<crate::domain::evaluation::EvaluationResult> {
            let now = chrono::Utc::now();
            Ok(crate::domain::evaluation::EvaluationResult {
                strategy_id,
                source: crate::domain::evaluation::EvaluationSource::Paper,
                metrics: crate::domain::evaluation::EvaluationMetrics::empty(),
                period_start: now - window,
                period_end: now,
                failure: None,
            })
        }

        async fn withdraw(&self, _strategy_id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_manual_rollback_through_the_handle() {
        let store = Arc::new(InMemoryGenerationStore::new());
        let backtester = Arc::new(SimulatedBacktester::new());
        let venue: Arc<dyn PaperTradeVenue> = Arc::new(QuietVenue);
        let evaluator = FitnessEvaluator::new(FitnessCalibration::default()).unwrap();

        let manager = GenerationManager::new(
            GeneSchema::momentum_v1(),
            EvolutionParams {
                population_size: 6,
                ..EvolutionParams::default()
            },
            evaluator.clone(),
            EvaluationDispatcher::new(backtester, DispatchLimits::default()),
            store.clone(),
            Some(2024),
        );
        let gate = Arc::new(DeploymentGate::new(
            PromotionPolicy::default(),
            store.clone(),
        ));
        let reconciler = LiveFeedbackReconciler::new(
            venue.clone(),
            gate.clone(),
            evaluator,
            ReconcilePolicy::default(),
        );
        let settings = SupervisorSettings {
            cycle_interval: Duration::from_millis(10),
            max_generations: None,
            ..SupervisorSettings::default()
        };
        let (supervisor, handle) =
            OptimizationSupervisor::new(manager, reconciler, gate.clone(), venue, settings);
        let runner = tokio::spawn(supervisor.run());

        // Wait for a candidate to appear.
        let mut candidate = None;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if let Some(record) = gate.records().await.into_iter().next() {
                candidate = Some(record.strategy_id);
                break;
            }
        }
        let strategy_id = candidate.expect("candidate registered");

        assert!(handle.request_rollback(strategy_id).await);
        let record = gate.record(strategy_id).await.unwrap();
        assert!(record.status.is_terminal());

        handle.shutdown().await;
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_fatal_storage_failure_stops_the_loop() {
        use crate::domain::deployment::DeploymentRecord;
        use crate::domain::errors::StorageError;
        use crate::domain::ports::GenerationStore;
        use async_trait::async_trait;

        struct BrokenStore;

        #[async_trait]
        impl GenerationStore for BrokenStore {
            async fn persist_generation(
                &self,
                _generation: &Generation,
            ) -> Result<(), StorageError> {
                Err(StorageError::Unavailable {
                    reason: "volume detached".to_string(),
                })
            }

            async fn persist_deployment(
                &self,
                _record: &DeploymentRecord,
            ) -> Result<(), StorageError> {
                Err(StorageError::Unavailable {
                    reason: "volume detached".to_string(),
                })
            }

            async fn query_recent(&self, _n: usize) -> Result<Vec<Generation>, StorageError> {
                Ok(Vec::new())
            }
        }

        let store: Arc<dyn GenerationStore> = Arc::new(BrokenStore);
        let backtester = Arc::new(SimulatedBacktester::new());
        let venue = Arc::new(SimulatedPaperVenue::new());
        let evaluator = FitnessEvaluator::new(FitnessCalibration::default()).unwrap();

        let manager = GenerationManager::new(
            GeneSchema::momentum_v1(),
            EvolutionParams {
                population_size: 4,
                ..EvolutionParams::default()
            },
            evaluator.clone(),
            EvaluationDispatcher::new(backtester, DispatchLimits::default()),
            store.clone(),
            Some(7),
        );
        let gate = Arc::new(DeploymentGate::new(PromotionPolicy::default(), store));
        let reconciler = LiveFeedbackReconciler::new(
            venue.clone(),
            gate.clone(),
            evaluator,
            ReconcilePolicy::default(),
        );

        let settings = SupervisorSettings {
            cycle_interval: Duration::from_millis(10),
            max_generations: Some(5),
            ..SupervisorSettings::default()
        };
        let (supervisor, _handle) =
            OptimizationSupervisor::new(manager, reconciler, gate, venue, settings);

        let result = supervisor.run().await;
        assert!(result.is_err());
    }
}
