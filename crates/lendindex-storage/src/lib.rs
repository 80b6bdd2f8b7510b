//! lendindex-storage: storage backends for the lending-platform indexer.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - `sqlite`: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx` (pooled, production)
//!
//! Every backend implements both [`EventStore`](lendindex_core::EventStore)
//! and [`CheckpointStore`](lendindex_core::CheckpointStore).

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;
