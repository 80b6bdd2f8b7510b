//! In-memory storage backend.
//!
//! Stores classified events and checkpoints in RAM. Useful for tests and
//! short-lived indexers that don't need persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use lendindex_core::checkpoint::{Checkpoint, CheckpointStore};
use lendindex_core::error::IndexerError;
use lendindex_core::event::{ChainEvent, EventName};
use lendindex_core::store::{EventStore, UpsertOutcome};

/// In-memory indexer storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    /// Keyed by `(transaction_hash, log_index)`.
    events: Mutex<HashMap<(String, u32), ChainEvent>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored event, ordered by block then log index.
    pub fn all_events(&self) -> Vec<ChainEvent> {
        let mut out: Vec<_> = self.events.lock().unwrap().values().cloned().collect();
        sort_events(&mut out);
        out
    }

    fn key(chain_id: &str, indexer_id: &str) -> String {
        format!("{chain_id}:{indexer_id}")
    }
}

fn sort_events(events: &mut [ChainEvent]) {
    events.sort_by(|a, b| {
        (a.block_number, a.log_index, &a.transaction_hash)
            .cmp(&(b.block_number, b.log_index, &b.transaction_hash))
    });
}

#[async_trait]
impl EventStore for InMemoryStorage {
    async fn upsert_event(&self, event: &ChainEvent) -> Result<UpsertOutcome, IndexerError> {
        let mut events = self.events.lock().unwrap();
        let key = (event.transaction_hash.clone(), event.log_index);
        if events.contains_key(&key) {
            return Ok(UpsertOutcome::Duplicate);
        }
        events.insert(key, event.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn mark_processed(
        &self,
        transaction_hash: &str,
        log_index: u32,
    ) -> Result<bool, IndexerError> {
        let mut events = self.events.lock().unwrap();
        match events.get_mut(&(transaction_hash.to_string(), log_index)) {
            Some(ev) => {
                ev.processed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unprocessed(&self, limit: usize) -> Result<Vec<ChainEvent>, IndexerError> {
        let mut out: Vec<_> = self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| !e.processed)
            .cloned()
            .collect();
        sort_events(&mut out);
        out.truncate(limit);
        Ok(out)
    }

    async fn events_by_name(&self, name: EventName) -> Result<Vec<ChainEvent>, IndexerError> {
        let mut out: Vec<_> = self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.event_name == name)
            .cloned()
            .collect();
        sort_events(&mut out);
        Ok(out)
    }

    async fn event_count(&self) -> Result<u64, IndexerError> {
        Ok(self.events.lock().unwrap().len() as u64)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap()
            .get(&Self::key(chain_id, indexer_id))
            .cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        let key = Self::key(&checkpoint.chain_id, &checkpoint.indexer_id);
        self.checkpoints.lock().unwrap().insert(key, checkpoint);
        Ok(())
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError> {
        self.checkpoints
            .lock()
            .unwrap()
            .remove(&Self::key(chain_id, indexer_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ev(name: EventName, tx: &str, block: u64, log_index: u32) -> ChainEvent {
        ChainEvent {
            event_name: name,
            contract_address: "0xvault".into(),
            transaction_hash: tx.into(),
            block_number: block,
            log_index,
            topics: vec!["0xsig".into()],
            data: vec![],
            processed: false,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = InMemoryStorage::new();
        let e = ev(EventName::NFTDeposited, "0xt1", 100, 0);
        assert_eq!(store.upsert_event(&e).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert_event(&e).await.unwrap(), UpsertOutcome::Duplicate);
        // Same tx, different log index is a distinct event.
        let e2 = ev(EventName::NFTDeposited, "0xt1", 100, 1);
        assert!(store.upsert_event(&e2).await.unwrap().is_inserted());
        assert_eq!(store.event_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn query_by_name_is_ordered() {
        let store = InMemoryStorage::new();
        store.upsert_event(&ev(EventName::LoanCreated, "0xb", 102, 0)).await.unwrap();
        store.upsert_event(&ev(EventName::LoanCreated, "0xa", 101, 4)).await.unwrap();
        store.upsert_event(&ev(EventName::LoanRepaid, "0xc", 101, 0)).await.unwrap();

        let created = store.events_by_name(EventName::LoanCreated).await.unwrap();
        let blocks: Vec<_> = created.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, vec![101, 102]);
    }

    #[tokio::test]
    async fn processed_flag_only_mutation() {
        let store = InMemoryStorage::new();
        store.upsert_event(&ev(EventName::LoanCreated, "0xa", 101, 0)).await.unwrap();
        store.upsert_event(&ev(EventName::LoanRepaid, "0xb", 102, 0)).await.unwrap();

        assert!(store.mark_processed("0xa", 0).await.unwrap());
        assert!(!store.mark_processed("0xmissing", 0).await.unwrap());

        let pending = store.unprocessed(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].transaction_hash, "0xb");

        // Re-upserting a processed event does not reset the flag.
        store.upsert_event(&ev(EventName::LoanCreated, "0xa", 101, 0)).await.unwrap();
        assert_eq!(store.unprocessed(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = InMemoryStorage::new();
        let cp = Checkpoint {
            chain_id: "saga".into(),
            indexer_id: "test".into(),
            block_number: 1000,
            updated_at: 0,
        };
        store.save(cp).await.unwrap();
        let loaded = store.load("saga", "test").await.unwrap().unwrap();
        assert_eq!(loaded.block_number, 1000);
        store.delete("saga", "test").await.unwrap();
        assert!(store.load("saga", "test").await.unwrap().is_none());
    }
}
