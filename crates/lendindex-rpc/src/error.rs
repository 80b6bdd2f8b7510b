//! Transport-level error types.

use thiserror::Error;

use lendindex_core::IndexerError;

use crate::request::JsonRpcError;

/// Errors that can occur while talking to the JSON-RPC endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, reset, non-2xx status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The call exceeded the per-call timeout.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl From<TransportError> for IndexerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http(msg) => IndexerError::Connectivity(msg),
            TransportError::Timeout { ms } => IndexerError::Timeout { ms },
            TransportError::Rpc(e) => IndexerError::Rpc {
                code: e.code,
                message: e.message,
            },
            TransportError::Deserialization(e) => IndexerError::Malformed(e.to_string()),
        }
    }
}
