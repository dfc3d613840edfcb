//! Genetic operators over schema-bound genomes.
//!
//! Every operator takes the random source as a parameter, so a seeded
//! `StdRng` reproduces a full run. Operators never mutate their inputs:
//! offspring are fresh genomes stamped with the caller's generation number.

use crate::domain::generation::RankedMember;
use crate::domain::genome::{GeneBounds, GeneSchema, GeneValue, Genome, draw_uniform};
use rand::Rng;
use rand::seq::index;
use std::collections::BTreeMap;

/// Per-gene mutation: with probability `rate`, replace the value with a
/// fresh uniform draw from its bounds. Categorical genes draw among the
/// other options when more than one exists, so a triggered mutation always
/// moves. Zero-width bounds make mutation a no-op for that gene.
pub fn mutate<R: Rng>(
    genome: &Genome,
    schema: &GeneSchema,
    rate: f64,
    child_generation: u64,
    rng: &mut R,
) -> Genome {
    let mut genes = genome.genes().clone();

    for spec in schema.genes() {
        if rng.random::<f64>() >= rate {
            continue;
        }
        let next = redraw(&spec.bounds, genes.get(&spec.name), rng);
        genes.insert(spec.name.clone(), next);
    }

    Genome::from_parts(child_generation, genes)
}

fn redraw<R: Rng>(bounds: &GeneBounds, current: Option<&GeneValue>, rng: &mut R) -> GeneValue {
    match bounds {
        GeneBounds::Categorical { options } if options.len() > 1 => {
            let current_name = match current {
                Some(GeneValue::Categorical(c)) => Some(c.as_str()),
                _ => None,
            };
            let pool: Vec<&String> = options
                .iter()
                .filter(|o| Some(o.as_str()) != current_name)
                .collect();
            let idx = rng.random_range(0..pool.len());
            GeneValue::Categorical(pool[idx].clone())
        }
        _ => draw_uniform(bounds, rng),
    }
}

/// Uniform crossover: per gene, an independent fair coin picks which parent
/// donates. The schema is fixed, so the child always carries exactly the
/// schema's genes.
pub fn crossover<R: Rng>(
    a: &Genome,
    b: &Genome,
    schema: &GeneSchema,
    child_generation: u64,
    rng: &mut R,
) -> Genome {
    let mut genes = BTreeMap::new();

    for spec in schema.genes() {
        let (donor, fallback) = if rng.random::<f64>() < 0.5 { (a, b) } else { (b, a) };
        let value = donor
            .gene(&spec.name)
            .or_else(|| fallback.gene(&spec.name))
            .cloned();
        if let Some(v) = value {
            genes.insert(spec.name.clone(), v);
        }
    }

    Genome::from_parts(child_generation, genes)
}

/// Tournament selection: draw `tournament_size` distinct members without
/// replacement, return the highest-scoring one. Ties resolve to the earliest
/// ranked position. Returns `None` on an empty population.
pub fn tournament_select<'a, R: Rng>(
    members: &'a [RankedMember],
    tournament_size: usize,
    rng: &mut R,
) -> Option<&'a RankedMember> {
    if members.is_empty() {
        return None;
    }

    let k = tournament_size.clamp(1, members.len());
    let mut best: Option<usize> = None;

    for i in index::sample(rng, members.len(), k) {
        best = Some(match best {
            None => i,
            Some(b) => {
                let challenger = members[i].score.value;
                let incumbent = members[b].score.value;
                if challenger > incumbent || (challenger == incumbent && i < b) {
                    i
                } else {
                    b
                }
            }
        });
    }

    best.map(|i| &members[i])
}

/// Two independent tournaments (with replacement across calls) producing a
/// parent pair.
pub fn select_parents<'a, R: Rng>(
    members: &'a [RankedMember],
    tournament_size: usize,
    rng: &mut R,
) -> Option<(&'a RankedMember, &'a RankedMember)> {
    let first = tournament_select(members, tournament_size, rng)?;
    let second = tournament_select(members, tournament_size, rng)?;
    Some((first, second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::{EvaluationMetrics, EvaluationResult, EvaluationSource};
    use crate::domain::fitness::FitnessScore;
    use crate::domain::genome::GeneSpec;
    use chrono::{Duration, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn member(genome: Genome, value: f64) -> RankedMember {
        let now = Utc::now();
        let result = EvaluationResult {
            strategy_id: genome.id(),
            source: EvaluationSource::Backtest,
            metrics: EvaluationMetrics::empty(),
            period_start: now - Duration::days(90),
            period_end: now,
            failure: None,
        };
        RankedMember {
            genome,
            score: FitnessScore {
                strategy_id: result.strategy_id,
                value,
                source: EvaluationSource::Backtest,
                insufficient_data: false,
                result,
            },
        }
    }

    #[test]
    fn test_mutate_rate_zero_is_identity() {
        let schema = GeneSchema::momentum_v1();
        let mut rng = StdRng::seed_from_u64(5);
        let genome = schema.sample_random(0, &mut rng);

        let child = mutate(&genome, &schema, 0.0, 1, &mut rng);
        assert_eq!(child, genome);
    }

    #[test]
    fn test_mutate_rate_one_with_zero_width_bounds_is_noop() {
        let schema = GeneSchema::new(vec![
            GeneSpec {
                name: "fixed_ratio".to_string(),
                bounds: GeneBounds::Continuous { min: 1.5, max: 1.5 },
            },
            GeneSpec {
                name: "only_mode".to_string(),
                bounds: GeneBounds::Categorical {
                    options: vec!["hold".to_string()],
                },
            },
            GeneSpec {
                name: "fixed_open".to_string(),
                bounds: GeneBounds::TimeOfDay { earliest: 570, latest: 570 },
            },
        ]);
        let mut rng = StdRng::seed_from_u64(5);
        let genome = schema.sample_random(0, &mut rng);

        let child = mutate(&genome, &schema, 1.0, 1, &mut rng);
        assert_eq!(child, genome);
    }

    #[test]
    fn test_mutate_rate_one_changes_categorical_genes() {
        let schema = GeneSchema::momentum_v1();
        let mut rng = StdRng::seed_from_u64(5);
        let genome = schema.sample_random(0, &mut rng);

        for _ in 0..20 {
            let child = mutate(&genome, &schema, 1.0, 1, &mut rng);
            // Multi-option categorical redraws exclude the current value.
            assert_ne!(child.gene("exit_style"), genome.gene("exit_style"));
            schema.validate(&child).unwrap();
        }
    }

    #[test]
    fn test_crossover_identical_parents_is_identity() {
        let schema = GeneSchema::momentum_v1();
        let mut rng = StdRng::seed_from_u64(5);
        let genome = schema.sample_random(0, &mut rng);

        let child = crossover(&genome, &genome, &schema, 1, &mut rng);
        assert_eq!(child, genome);
    }

    #[test]
    fn test_crossover_child_genes_come_from_parents() {
        let schema = GeneSchema::momentum_v1();
        let mut rng = StdRng::seed_from_u64(5);
        let a = schema.sample_random(0, &mut rng);
        let b = schema.sample_random(0, &mut rng);

        let child = crossover(&a, &b, &schema, 1, &mut rng);
        schema.validate(&child).unwrap();

        for spec in schema.genes() {
            let value = child.gene(&spec.name).unwrap();
            assert!(
                Some(value) == a.gene(&spec.name) || Some(value) == b.gene(&spec.name),
                "gene '{}' came from neither parent",
                spec.name
            );
        }
    }

    #[test]
    fn test_tournament_with_full_population_returns_best() {
        let schema = GeneSchema::momentum_v1();
        let mut rng = StdRng::seed_from_u64(5);

        let members: Vec<RankedMember> = [40.0, 80.0, 60.0]
            .iter()
            .map(|&v| member(schema.sample_random(0, &mut rng), v))
            .collect();

        // Tournament over the whole population always selects the maximum.
        let winner = tournament_select(&members, 3, &mut rng).unwrap();
        assert_eq!(winner.score.value, 80.0);
    }

    #[test]
    fn test_tournament_tie_breaks_to_earliest_position() {
        let schema = GeneSchema::momentum_v1();
        let mut rng = StdRng::seed_from_u64(5);

        let members: Vec<RankedMember> = [50.0, 50.0, 50.0]
            .iter()
            .map(|&v| member(schema.sample_random(0, &mut rng), v))
            .collect();

        let winner = tournament_select(&members, 3, &mut rng).unwrap();
        assert_eq!(winner.genome.id(), members[0].genome.id());
    }

    #[test]
    fn test_tournament_on_empty_population() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(tournament_select(&[], 3, &mut rng).is_none());
    }

    #[test]
    fn test_select_parents_returns_pair() {
        let schema = GeneSchema::momentum_v1();
        let mut rng = StdRng::seed_from_u64(5);

        let members: Vec<RankedMember> = [10.0, 20.0]
            .iter()
            .map(|&v| member(schema.sample_random(0, &mut rng), v))
            .collect();

        let (a, b) = select_parents(&members, 3, &mut rng).unwrap();
        assert_eq!(a.score.value, 20.0);
        assert_eq!(b.score.value, 20.0);
    }
}
