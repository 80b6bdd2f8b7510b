//! Event store trait: the append/upsert sink for classified events.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::event::{ChainEvent, EventName};

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The event was new and has been written.
    Inserted,
    /// An event with the same `(transaction_hash, log_index)` already existed;
    /// nothing was written.
    Duplicate,
}

impl UpsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Persistent, append-only storage for [`ChainEvent`] rows.
///
/// Implementations must treat `(transaction_hash, log_index)` as a unique key
/// so that re-scanning a block range never produces duplicate rows.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert `event` unless its key is already present.
    async fn upsert_event(&self, event: &ChainEvent) -> Result<UpsertOutcome, IndexerError>;

    /// Flag an event as consumed downstream. Returns `false` if no such event.
    async fn mark_processed(
        &self,
        transaction_hash: &str,
        log_index: u32,
    ) -> Result<bool, IndexerError>;

    /// Oldest unprocessed events, ordered by block then log index.
    async fn unprocessed(&self, limit: usize) -> Result<Vec<ChainEvent>, IndexerError>;

    /// All events of one kind, ordered by block then log index.
    async fn events_by_name(&self, name: EventName) -> Result<Vec<ChainEvent>, IndexerError>;

    /// Total number of stored events.
    async fn event_count(&self) -> Result<u64, IndexerError>;
}
