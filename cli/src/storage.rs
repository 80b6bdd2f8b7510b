//! Storage backend selection from a database URL.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use lendindex_core::{CheckpointStore, EventStore};
use lendindex_storage::postgres::PostgresStorage;
use lendindex_storage::sqlite::SqliteStorage;
use lendindex_storage::InMemoryStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() || url == "memory" || url == "memory:" {
            Ok(Self::Memory)
        } else if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else {
            bail!("unsupported DATABASE_URL scheme: {url}")
        }
    }
}

/// One backend seen through both store traits.
#[derive(Clone)]
pub struct Storage {
    pub backend: Backend,
    pub events: Arc<dyn EventStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

impl Storage {
    fn from_backend<S>(backend: Backend, store: Arc<S>) -> Self
    where
        S: EventStore + CheckpointStore + 'static,
    {
        Self {
            backend,
            events: store.clone(),
            checkpoints: store,
        }
    }
}

pub async fn open(url: &str) -> Result<Storage> {
    let backend = Backend::from_url(url)?;
    let storage = match backend {
        Backend::Memory => Storage::from_backend(backend, Arc::new(InMemoryStorage::new())),
        Backend::Sqlite => {
            let store = SqliteStorage::open(url.trim())
                .await
                .with_context(|| format!("opening {url}"))?;
            Storage::from_backend(backend, Arc::new(store))
        }
        Backend::Postgres => {
            let store = PostgresStorage::connect(url.trim())
                .await
                .context("connecting to postgres")?;
            Storage::from_backend(backend, Arc::new(store))
        }
    };
    tracing::info!(backend = ?storage.backend, "storage ready");
    Ok(storage)
}
