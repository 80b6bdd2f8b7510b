//! Checkpoints: persist the scan watermark for crash recovery.
//!
//! A checkpoint stores the last fully processed block number. On restart the
//! indexer resumes from it, re-scanning at most the batch that was in flight
//! when the process died.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// A persisted checkpoint for an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Chain slug (e.g. `"saga"`).
    pub chain_id: String,
    /// Unique indexer identifier.
    pub indexer_id: String,
    /// Last fully processed block number.
    pub block_number: u64,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Storage for checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a chain + indexer pair.
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError>;

    /// Delete a checkpoint (e.g. when resetting an indexer).
    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError>;
}

/// Binds a [`CheckpointStore`] to one indexer's key.
pub struct CheckpointManager {
    store: std::sync::Arc<dyn CheckpointStore>,
    chain_id: String,
    indexer_id: String,
}

impl CheckpointManager {
    pub fn new(
        store: std::sync::Arc<dyn CheckpointStore>,
        chain_id: impl Into<String>,
        indexer_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            chain_id: chain_id.into(),
            indexer_id: indexer_id.into(),
        }
    }

    /// Load the saved checkpoint (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<Checkpoint>, IndexerError> {
        self.store.load(&self.chain_id, &self.indexer_id).await
    }

    /// Persist `block_number` as the new watermark.
    pub async fn save(&self, block_number: u64) -> Result<(), IndexerError> {
        let cp = Checkpoint {
            chain_id: self.chain_id.clone(),
            indexer_id: self.indexer_id.clone(),
            block_number,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(cp).await
    }

    /// Forget the checkpoint so the next start begins from configuration.
    pub async fn reset(&self) -> Result<(), IndexerError> {
        self.store.delete(&self.chain_id, &self.indexer_id).await
    }
}
