//! Error types for the indexing pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Network or transport fault talking to the node (connection reset,
    /// refused, HTTP failure).
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// An RPC call did not complete within the configured per-call timeout.
    #[error("RPC call timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("receipt for transaction {0} not found")]
    ReceiptNotFound(String),

    /// A node response could not be interpreted (bad hex, missing field).
    #[error("malformed chain data: {0}")]
    Malformed(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Every recovery attempt failed; the indexer has fail-stopped.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },

    #[error("indexer is stopped")]
    Stopped,
}

impl IndexerError {
    /// Returns `true` for faults that a reconnect-and-retry may cure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout { .. })
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    pub fn storage(reason: impl std::fmt::Display) -> Self {
        Self::Storage(reason.to_string())
    }
}
