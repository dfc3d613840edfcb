//! In-Memory Store Implementation
//!
//! Thread-safe, in-memory implementation of the `GenerationStore` port,
//! using `Arc<RwLock>` for concurrent access. Suitable for tests,
//! development, and single-instance runs; a durable backend implements the
//! same trait without touching the optimization core.
//!
//! Deployment transitions are kept as an append log, matching the
//! append-mostly storage contract — a record's history is the sequence of
//! its persisted snapshots.

use crate::domain::deployment::DeploymentRecord;
use crate::domain::errors::StorageError;
use crate::domain::generation::Generation;
use crate::domain::ports::GenerationStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct InMemoryGenerationStore {
    generations: Arc<RwLock<Vec<Generation>>>,
    deployment_log: Arc<RwLock<Vec<DeploymentRecord>>>,
}

impl InMemoryGenerationStore {
    pub fn new() -> Self {
        Self {
            generations: Arc::new(RwLock::new(Vec::new())),
            deployment_log: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn generation_count(&self) -> usize {
        self.generations.read().await.len()
    }

    /// Full transition history, oldest first.
    pub async fn deployment_log(&self) -> Vec<DeploymentRecord> {
        self.deployment_log.read().await.clone()
    }
}

impl Default for InMemoryGenerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationStore for InMemoryGenerationStore {
    async fn persist_generation(&self, generation: &Generation) -> Result<(), StorageError> {
        self.generations.write().await.push(generation.clone());
        Ok(())
    }

    async fn persist_deployment(&self, record: &DeploymentRecord) -> Result<(), StorageError> {
        self.deployment_log.write().await.push(record.clone());
        Ok(())
    }

    async fn query_recent(&self, n: usize) -> Result<Vec<Generation>, StorageError> {
        let generations = self.generations.read().await;
        Ok(generations.iter().rev().take(n).cloned().collect())
    }
}
