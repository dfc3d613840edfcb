//! Sealed generation cohorts.
//!
//! A generation is one population evaluated and ranked together. Sealing
//! happens in the constructor: members are ranked once (descending score,
//! ties stable by genome id) and the cohort is immutable afterward. The next
//! generation references this one through the manager's lineage but never
//! mutates it.

use crate::domain::fitness::FitnessScore;
use crate::domain::genome::Genome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One evaluated member of a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMember {
    pub genome: Genome,
    pub score: FitnessScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    number: u64,
    members: Vec<RankedMember>,
    elite_count: usize,
    sealed_at: DateTime<Utc>,
}

impl Generation {
    /// Rank and seal a cohort. Descending by score value, ties stable by
    /// genome id.
    pub fn seal(number: u64, mut members: Vec<RankedMember>, elite_count: usize) -> Self {
        members.sort_by(|a, b| {
            b.score
                .value
                .partial_cmp(&a.score.value)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.genome.id().cmp(&b.genome.id()))
        });

        let elite_count = elite_count.min(members.len());
        Self {
            number,
            members,
            elite_count,
            sealed_at: Utc::now(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn members(&self) -> &[RankedMember] {
        &self.members
    }

    pub fn elite_count(&self) -> usize {
        self.elite_count
    }

    pub fn sealed_at(&self) -> DateTime<Utc> {
        self.sealed_at
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Highest-ranked member, if the cohort is non-empty.
    pub fn best(&self) -> Option<&RankedMember> {
        self.members.first()
    }

    /// The members carried unchanged into the next generation.
    pub fn elites(&self) -> &[RankedMember] {
        &self.members[..self.elite_count.min(self.members.len())]
    }

    /// Members whose evaluation failed outright.
    pub fn failure_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.score.result.failure.is_some())
            .count()
    }
}
