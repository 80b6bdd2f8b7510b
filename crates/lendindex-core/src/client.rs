//! Chain client traits: the indexer's only view of the node.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{Block, Log, LogFilter, Receipt};

/// Read-only access to a chain node.
///
/// Every method may fail with a transient error
/// ([`IndexerError::is_transient`]); callers decide whether to retry.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain head height.
    async fn latest_height(&self) -> Result<u64, IndexerError>;

    /// Block at `height` with its full transaction list, fetched in one call.
    async fn get_block(&self, height: u64) -> Result<Option<Block>, IndexerError>;

    /// Receipt (with logs) of a mined transaction.
    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, IndexerError>;

    /// Logs emitted in `[from, to]` by the addresses in `filter`
    /// (`eth_getLogs`). Logs the node sends malformed are left out.
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<Vec<Log>, IndexerError>;

    /// Chain id reported by the node; doubles as a liveness check.
    async fn chain_id(&self) -> Result<u64, IndexerError>;
}

/// Builds fresh [`ChainClient`] connections.
///
/// Recovery tears down the current client and asks the connector for a new
/// one, discarding stale sockets and dropped sessions.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, IndexerError>;
}
