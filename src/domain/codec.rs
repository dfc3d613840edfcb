//! Flat-vector codec for operator convenience.
//!
//! Encodes a genome into an ordered `Vec<f64>` (schema order; categorical
//! genes map to their option index, time-of-day to minutes) and decodes back.
//! Decoding clips rather than rejects: continuous values clamp to bounds,
//! categorical indices round and clamp into the option set. This keeps the
//! evolution operators total over the gene space — a vector mangled by
//! arithmetic still decodes to a legal genome. The only hard failure is an
//! arity mismatch against the schema.

use crate::domain::errors::GenomeError;
use crate::domain::genome::{GeneBounds, GeneSchema, GeneValue, Genome};
use std::collections::BTreeMap;

/// Flatten a genome into schema order.
pub fn encode(genome: &Genome, schema: &GeneSchema) -> Result<Vec<f64>, GenomeError> {
    let mut vector = Vec::with_capacity(schema.len());

    for spec in schema.genes() {
        let value = genome
            .gene(&spec.name)
            .ok_or_else(|| GenomeError::MissingGene {
                gene: spec.name.clone(),
            })?;

        let encoded = match (&spec.bounds, value) {
            (GeneBounds::Continuous { .. }, GeneValue::Continuous(v)) => *v,
            (GeneBounds::Categorical { options }, GeneValue::Categorical(c)) => {
                let idx = options.iter().position(|o| o == c).ok_or_else(|| {
                    GenomeError::UnknownCategory {
                        gene: spec.name.clone(),
                        value: c.clone(),
                    }
                })?;
                idx as f64
            }
            (GeneBounds::TimeOfDay { .. }, GeneValue::TimeOfDay(m)) => f64::from(*m),
            _ => {
                return Err(GenomeError::TypeMismatch {
                    gene: spec.name.clone(),
                });
            }
        };
        vector.push(encoded);
    }

    Ok(vector)
}

/// Rebuild a genome from a flat vector, clipping every slot into bounds.
pub fn decode(
    vector: &[f64],
    schema: &GeneSchema,
    generation: u64,
) -> Result<Genome, GenomeError> {
    if vector.len() != schema.len() {
        return Err(GenomeError::ArityMismatch {
            expected: schema.len(),
            actual: vector.len(),
        });
    }

    let mut genes = BTreeMap::new();
    for (spec, raw) in schema.genes().iter().zip(vector) {
        genes.insert(spec.name.clone(), clip_slot(&spec.bounds, *raw));
    }

    Ok(Genome::from_parts(generation, genes))
}

fn clip_slot(bounds: &GeneBounds, raw: f64) -> GeneValue {
    match bounds {
        GeneBounds::Continuous { min, max } => {
            let v = if raw.is_finite() { raw.clamp(*min, *max) } else { *min };
            GeneValue::Continuous(v)
        }
        GeneBounds::Categorical { options } => {
            let last = (options.len() - 1) as f64;
            let idx = if raw.is_finite() { raw.round().clamp(0.0, last) } else { 0.0 };
            GeneValue::Categorical(options[idx as usize].clone())
        }
        GeneBounds::TimeOfDay { earliest, latest } => {
            let v = if raw.is_finite() {
                raw.round().clamp(f64::from(*earliest), f64::from(*latest))
            } else {
                f64::from(*earliest)
            };
            GeneValue::TimeOfDay(v as u32)
        }
    }
}
