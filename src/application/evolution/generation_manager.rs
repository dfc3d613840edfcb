//! Generation lifecycle orchestration.
//!
//! One cycle walks the phases Building → Evaluating → Ranking → Persisted →
//! Evolving. The manager owns the population between cycles: Evolving
//! produces the next population, which the following cycle picks up in
//! Building. Generations are strictly ordered and fully sealed before the
//! next begins; only a storage failure aborts a cycle, since an unpersisted
//! generation would corrupt the lineage.

use crate::application::evaluation::dispatcher::{EvaluationDispatcher, EvaluationRequest};
use crate::application::evolution::operators::{crossover, mutate, select_parents};
use crate::domain::codec;
use crate::domain::errors::StorageError;
use crate::domain::evaluation::{EvaluationResult, EvaluationSource};
use crate::domain::fitness::FitnessEvaluator;
use crate::domain::generation::{Generation, RankedMember};
use crate::domain::genome::{GeneSchema, Genome};
use crate::domain::ports::GenerationStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Genetic algorithm parameters for one run.
#[derive(Debug, Clone, Copy)]
pub struct EvolutionParams {
    pub population_size: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    /// Share of the ranked population carried unchanged. Zero disables
    /// elitism.
    pub elite_fraction: f64,
    pub tournament_size: usize,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self {
            population_size: 24,
            mutation_rate: 0.15,
            crossover_rate: 0.70,
            elite_fraction: 0.20,
            tournament_size: 3,
        }
    }
}

impl EvolutionParams {
    pub fn elite_count(&self) -> usize {
        (self.elite_fraction * self.population_size as f64).floor() as usize
    }
}

/// Cycle phase, for logging and the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Building,
    Evaluating,
    Ranking,
    Persisted,
    Evolving,
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CyclePhase::Building => write!(f, "building"),
            CyclePhase::Evaluating => write!(f, "evaluating"),
            CyclePhase::Ranking => write!(f, "ranking"),
            CyclePhase::Persisted => write!(f, "persisted"),
            CyclePhase::Evolving => write!(f, "evolving"),
        }
    }
}

pub struct GenerationManager {
    schema: GeneSchema,
    params: EvolutionParams,
    evaluator: FitnessEvaluator,
    dispatcher: EvaluationDispatcher,
    store: Arc<dyn GenerationStore>,
    rng: StdRng,
    next_number: u64,
    /// Population built by the previous cycle's Evolving phase. Empty before
    /// generation zero.
    pending: Vec<Genome>,
    latest: Option<Arc<Generation>>,
}

impl GenerationManager {
    pub fn new(
        schema: GeneSchema,
        params: EvolutionParams,
        evaluator: FitnessEvaluator,
        dispatcher: EvaluationDispatcher,
        store: Arc<dyn GenerationStore>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            schema,
            params,
            evaluator,
            dispatcher,
            store,
            rng,
            next_number: 0,
            pending: Vec::new(),
            latest: None,
        }
    }

    /// The most recently sealed generation.
    pub fn latest(&self) -> Option<&Arc<Generation>> {
        self.latest.as_ref()
    }

    /// Run one full cycle and return the sealed generation.
    pub async fn run_cycle(
        &mut self,
        request: &EvaluationRequest,
    ) -> Result<Arc<Generation>, StorageError> {
        let number = self.next_number;

        debug!(generation = number, phase = %CyclePhase::Building, "Cycle phase");
        let population = self.build_population(number);

        debug!(
            generation = number,
            phase = %CyclePhase::Evaluating,
            population = population.len(),
            "Cycle phase"
        );
        let results = self.dispatcher.dispatch(&population, request).await;
        let members = self.pair_and_score(number, population, results, request);

        debug!(generation = number, phase = %CyclePhase::Ranking, "Cycle phase");
        let generation = Generation::seal(number, members, self.params.elite_count());

        self.store.persist_generation(&generation).await?;
        debug!(generation = number, phase = %CyclePhase::Persisted, "Cycle phase");

        let generation = Arc::new(generation);
        self.latest = Some(generation.clone());
        self.next_number += 1;

        debug!(generation = number, phase = %CyclePhase::Evolving, "Cycle phase");
        self.pending = self.evolve(&generation);

        info!(
            generation = number,
            best = generation.best().map(|m| m.score.value).unwrap_or(0.0),
            failures = generation.failure_count(),
            "Generation sealed"
        );

        Ok(generation)
    }

    fn build_population(&mut self, number: u64) -> Vec<Genome> {
        if !self.pending.is_empty() {
            return std::mem::take(&mut self.pending);
        }

        (0..self.params.population_size)
            .map(|_| self.schema.sample_random(number, &mut self.rng))
            .collect()
    }

    /// Pair every genome with its result and score it. The dispatcher
    /// guarantees one result per genome; a gap here is a programming error,
    /// reported and covered with a failure-marked result so the cohort stays
    /// whole.
    fn pair_and_score(
        &self,
        number: u64,
        population: Vec<Genome>,
        results: Vec<EvaluationResult>,
        request: &EvaluationRequest,
    ) -> Vec<RankedMember> {
        let mut by_id: HashMap<_, _> = results
            .into_iter()
            .map(|r| (r.strategy_id, r))
            .collect();

        population
            .into_iter()
            .map(|genome| {
                let result = by_id.remove(&genome.id()).unwrap_or_else(|| {
                    error!(
                        generation = number,
                        strategy_id = %genome.id(),
                        "Dispatcher returned no result for genome"
                    );
                    EvaluationResult::failed(
                        genome.id(),
                        EvaluationSource::Backtest,
                        request.period.start,
                        request.period.end,
                        "no result returned",
                    )
                });
                let score = self.evaluator.score(&result);
                RankedMember { genome, score }
            })
            .collect()
    }

    /// Produce the next population: elites copied unchanged, remainder
    /// filled by selection → crossover → mutation.
    fn evolve(&mut self, generation: &Generation) -> Vec<Genome> {
        let target = self.params.population_size;
        let child_generation = generation.number() + 1;
        let mut next = Vec::with_capacity(target);

        for elite in generation.elites() {
            next.push(elite.genome.clone());
        }

        while next.len() < target {
            let child = match select_parents(
                generation.members(),
                self.params.tournament_size,
                &mut self.rng,
            ) {
                Some((pa, pb)) => {
                    let base = if self.rng.random::<f64>() < self.params.crossover_rate {
                        crossover(&pa.genome, &pb.genome, &self.schema, child_generation, &mut self.rng)
                    } else {
                        pa.genome.clone()
                    };
                    mutate(
                        &base,
                        &self.schema,
                        self.params.mutation_rate,
                        child_generation,
                        &mut self.rng,
                    )
                }
                None => self.schema.sample_random(child_generation, &mut self.rng),
            };

            next.push(self.repair(child, child_generation));
        }

        next.truncate(target);
        next
    }

    /// An out-of-bounds child after the operators is a bug; clip it through
    /// the codec, and fall back to a fresh sample if even that fails.
    fn repair(&mut self, child: Genome, child_generation: u64) -> Genome {
        if self.schema.validate(&child).is_ok() {
            return child;
        }

        warn!(strategy_id = %child.id(), "Offspring violated schema bounds, clipping");
        match codec::encode(&child, &self.schema)
            .and_then(|v| codec::decode(&v, &self.schema, child_generation))
        {
            Ok(clipped) => clipped,
            Err(e) => {
                error!("Failed to clip offspring ({e}), replacing with a fresh sample");
                self.schema.sample_random(child_generation, &mut self.rng)
            }
        }
    }
}
