//! SQLite storage backend.
//!
//! Persists classified events and checkpoints to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use lendindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./lendindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use lendindex_core::checkpoint::{Checkpoint, CheckpointStore};
use lendindex_core::error::IndexerError;
use lendindex_core::event::{ChainEvent, EventName};
use lendindex_core::store::{EventStore, UpsertOutcome};

const EVENT_COLUMNS: &str = "event_name, contract_address, transaction_hash, block_number, \
     log_index, topics, data, processed, observed_at";

/// SQLite-backed storage for events and checkpoints.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./lendindex.db"`) or a full
    /// SQLite URL (`"sqlite:./lendindex.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        if path.ends_with(":memory:") {
            return Self::in_memory().await;
        }
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(IndexerError::storage)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool is pinned to one connection; every connection would
    /// otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(IndexerError::storage)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(IndexerError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                chain_id     TEXT    NOT NULL,
                indexer_id   TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL,
                PRIMARY KEY (chain_id, indexer_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(IndexerError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chain_events (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                event_name       TEXT    NOT NULL,
                contract_address TEXT    NOT NULL,
                transaction_hash TEXT    NOT NULL,
                block_number     INTEGER NOT NULL,
                log_index        INTEGER NOT NULL,
                topics           TEXT    NOT NULL,
                data             BLOB    NOT NULL,
                processed        INTEGER NOT NULL DEFAULT 0,
                observed_at      INTEGER NOT NULL,
                UNIQUE (transaction_hash, log_index)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(IndexerError::storage)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chain_events_name
             ON chain_events (event_name);",
        )
        .execute(&self.pool)
        .await
        .map_err(IndexerError::storage)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chain_events_pending
             ON chain_events (processed, block_number, log_index);",
        )
        .execute(&self.pool)
        .await
        .map_err(IndexerError::storage)?;

        Ok(())
    }
}

fn row_to_event(row: &SqliteRow) -> Result<ChainEvent, IndexerError> {
    let name: String = row.get("event_name");
    let topics: String = row.get("topics");
    let observed_ms: i64 = row.get("observed_at");
    Ok(ChainEvent {
        event_name: name.parse::<EventName>().map_err(IndexerError::Storage)?,
        contract_address: row.get("contract_address"),
        transaction_hash: row.get("transaction_hash"),
        block_number: row.get::<i64, _>("block_number") as u64,
        log_index: row.get::<i64, _>("log_index") as u32,
        topics: serde_json::from_str(&topics).map_err(IndexerError::storage)?,
        data: row.get("data"),
        processed: row.get("processed"),
        observed_at: DateTime::<Utc>::from_timestamp_millis(observed_ms)
            .ok_or_else(|| IndexerError::Storage(format!("bad observed_at {observed_ms}")))?,
    })
}

#[async_trait]
impl EventStore for SqliteStorage {
    async fn upsert_event(&self, event: &ChainEvent) -> Result<UpsertOutcome, IndexerError> {
        let topics = serde_json::to_string(&event.topics).map_err(IndexerError::storage)?;

        let result = sqlx::query(
            "INSERT INTO chain_events
                (event_name, contract_address, transaction_hash, block_number,
                 log_index, topics, data, processed, observed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (transaction_hash, log_index) DO NOTHING",
        )
        .bind(event.event_name.as_str())
        .bind(&event.contract_address)
        .bind(&event.transaction_hash)
        .bind(event.block_number as i64)
        .bind(event.log_index as i64)
        .bind(&topics)
        .bind(&event.data)
        .bind(event.processed)
        .bind(event.observed_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(IndexerError::storage)?;

        if result.rows_affected() == 0 {
            debug!(
                tx = %event.transaction_hash,
                log_index = event.log_index,
                "duplicate event skipped"
            );
            return Ok(UpsertOutcome::Duplicate);
        }
        debug!(event = %event.event_name, block = event.block_number, "event stored");
        Ok(UpsertOutcome::Inserted)
    }

    async fn mark_processed(
        &self,
        transaction_hash: &str,
        log_index: u32,
    ) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            "UPDATE chain_events SET processed = 1
             WHERE transaction_hash = ? AND log_index = ?",
        )
        .bind(transaction_hash)
        .bind(log_index as i64)
        .execute(&self.pool)
        .await
        .map_err(IndexerError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn unprocessed(&self, limit: usize) -> Result<Vec<ChainEvent>, IndexerError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM chain_events
             WHERE processed = 0 ORDER BY block_number, log_index LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(IndexerError::storage)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn events_by_name(&self, name: EventName) -> Result<Vec<ChainEvent>, IndexerError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM chain_events
             WHERE event_name = ? ORDER BY block_number, log_index"
        ))
        .bind(name.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(IndexerError::storage)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn event_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM chain_events")
            .fetch_one(&self.pool)
            .await
            .map_err(IndexerError::storage)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }
}

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT chain_id, indexer_id, block_number, updated_at
             FROM checkpoints WHERE chain_id = ? AND indexer_id = ?",
        )
        .bind(chain_id)
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(IndexerError::storage)?;

        Ok(row.map(|r| Checkpoint {
            chain_id: r.get("chain_id"),
            indexer_id: r.get("indexer_id"),
            block_number: r.get::<i64, _>("block_number") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO checkpoints (chain_id, indexer_id, block_number, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (chain_id, indexer_id)
             DO UPDATE SET block_number = excluded.block_number,
                           updated_at   = excluded.updated_at",
        )
        .bind(&checkpoint.chain_id)
        .bind(&checkpoint.indexer_id)
        .bind(checkpoint.block_number as i64)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(IndexerError::storage)?;

        debug!(block = checkpoint.block_number, "checkpoint saved");
        Ok(())
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM checkpoints WHERE chain_id = ? AND indexer_id = ?")
            .bind(chain_id)
            .bind(indexer_id)
            .execute(&self.pool)
            .await
            .map_err(IndexerError::storage)?;
        Ok(())
    }
}
