//! Strategy genome: a schema-driven, bounded parameter set.
//!
//! A genome is the full set of tunable parameters for one trading strategy.
//! Gene names, types, and legal bounds live in a shared [`GeneSchema`];
//! individual genomes only carry values. Construction goes through the schema
//! so an out-of-bounds genome cannot exist outside of a bug, and genomes are
//! immutable once built: the evolution operators always return new instances.

use crate::domain::errors::GenomeError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Legal bounds for a single gene, declared once in the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneBounds {
    /// Uniform continuous range, inclusive on both ends.
    Continuous { min: f64, max: f64 },
    /// Closed set of named options. Must carry at least one option.
    Categorical { options: Vec<String> },
    /// Minutes since midnight, inclusive range.
    TimeOfDay { earliest: u32, latest: u32 },
}

/// A single gene value. The variant must match the schema bounds variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneValue {
    Continuous(f64),
    Categorical(String),
    TimeOfDay(u32),
}

impl std::fmt::Display for GeneValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneValue::Continuous(v) => write!(f, "{v:.4}"),
            GeneValue::Categorical(c) => write!(f, "{c}"),
            GeneValue::TimeOfDay(minutes) => {
                write!(f, "{:02}:{:02}", minutes / 60, minutes % 60)
            }
        }
    }
}

/// One named, bounded gene in the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneSpec {
    pub name: String,
    pub bounds: GeneBounds,
}

/// Ordered, fixed set of gene declarations shared by every genome.
///
/// The schema owns gene ordering for the flat codec and is the only place
/// bounds are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneSchema {
    genes: Vec<GeneSpec>,
}

impl GeneSchema {
    pub fn new(genes: Vec<GeneSpec>) -> Self {
        Self { genes }
    }

    /// Default parameter set for the momentum strategy family.
    pub fn momentum_v1() -> Self {
        let gene = |name: &str, bounds: GeneBounds| GeneSpec {
            name: name.to_string(),
            bounds,
        };

        Self::new(vec![
            gene("momentum_period", GeneBounds::Continuous { min: 5.0, max: 40.0 }),
            gene("entry_threshold", GeneBounds::Continuous { min: 10.0, max: 50.0 }),
            gene("trend_ma_period", GeneBounds::Continuous { min: 50.0, max: 200.0 }),
            gene("stop_loss_pct", GeneBounds::Continuous { min: 0.5, max: 8.0 }),
            gene("take_profit_pct", GeneBounds::Continuous { min: 1.0, max: 20.0 }),
            gene("risk_scale", GeneBounds::Continuous { min: 0.25, max: 2.0 }),
            gene(
                "exit_style",
                GeneBounds::Categorical {
                    options: vec![
                        "fixed_target".to_string(),
                        "trailing_stop".to_string(),
                        "signal_flip".to_string(),
                    ],
                },
            ),
            // 09:30 through 12:00, minutes since midnight
            gene("entry_window_start", GeneBounds::TimeOfDay { earliest: 570, latest: 720 }),
        ])
    }

    pub fn genes(&self) -> &[GeneSpec] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn spec(&self, name: &str) -> Option<&GeneSpec> {
        self.genes.iter().find(|g| g.name == name)
    }

    /// Draw a fresh genome with each gene sampled uniformly from its bounds.
    pub fn sample_random<R: Rng>(&self, generation: u64, rng: &mut R) -> Genome {
        let mut genes = BTreeMap::new();
        for spec in &self.genes {
            genes.insert(spec.name.clone(), draw_uniform(&spec.bounds, rng));
        }
        Genome::from_parts(generation, genes)
    }

    /// Check every schema gene is present, correctly typed, and in bounds.
    pub fn validate(&self, genome: &Genome) -> Result<(), GenomeError> {
        for spec in &self.genes {
            let value = genome
                .gene(&spec.name)
                .ok_or_else(|| GenomeError::MissingGene {
                    gene: spec.name.clone(),
                })?;
            validate_value(spec, value)?;
        }
        for name in genome.genes().keys() {
            if self.spec(name).is_none() {
                return Err(GenomeError::UnknownGene { gene: name.clone() });
            }
        }
        Ok(())
    }
}

/// Uniform draw from one gene's bounds.
pub(crate) fn draw_uniform<R: Rng>(bounds: &GeneBounds, rng: &mut R) -> GeneValue {
    match bounds {
        GeneBounds::Continuous { min, max } => {
            GeneValue::Continuous(rng.random_range(*min..=*max))
        }
        GeneBounds::Categorical { options } => {
            let idx = rng.random_range(0..options.len());
            GeneValue::Categorical(options[idx].clone())
        }
        GeneBounds::TimeOfDay { earliest, latest } => {
            GeneValue::TimeOfDay(rng.random_range(*earliest..=*latest))
        }
    }
}

fn validate_value(spec: &GeneSpec, value: &GeneValue) -> Result<(), GenomeError> {
    match (&spec.bounds, value) {
        (GeneBounds::Continuous { min, max }, GeneValue::Continuous(v)) => {
            if v < min || v > max || !v.is_finite() {
                return Err(GenomeError::OutOfBounds {
                    gene: spec.name.clone(),
                    value: *v,
                    min: *min,
                    max: *max,
                });
            }
            Ok(())
        }
        (GeneBounds::Categorical { options }, GeneValue::Categorical(c)) => {
            if !options.contains(c) {
                return Err(GenomeError::UnknownCategory {
                    gene: spec.name.clone(),
                    value: c.clone(),
                });
            }
            Ok(())
        }
        (GeneBounds::TimeOfDay { earliest, latest }, GeneValue::TimeOfDay(m)) => {
            if m < earliest || m > latest {
                return Err(GenomeError::OutOfBounds {
                    gene: spec.name.clone(),
                    value: f64::from(*m),
                    min: f64::from(*earliest),
                    max: f64::from(*latest),
                });
            }
            Ok(())
        }
        _ => Err(GenomeError::TypeMismatch {
            gene: spec.name.clone(),
        }),
    }
}

/// A strategy's full set of tunable parameters.
///
/// `id` and `generation` are lineage metadata. Equality compares gene values
/// only, so the operator algebra reads naturally: `mutate(g, 0) == g` and
/// `crossover(a, a) == a` hold even though offspring get fresh identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    id: Uuid,
    generation: u64,
    genes: BTreeMap<String, GeneValue>,
}

impl Genome {
    pub(crate) fn from_parts(generation: u64, genes: BTreeMap<String, GeneValue>) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            genes,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn gene(&self, name: &str) -> Option<&GeneValue> {
        self.genes.get(name)
    }

    pub fn genes(&self) -> &BTreeMap<String, GeneValue> {
        &self.genes
    }
}

impl PartialEq for Genome {
    fn eq(&self, other: &Self) -> bool {
        self.genes == other.genes
    }
}
