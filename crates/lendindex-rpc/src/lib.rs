//! lendindex-rpc: JSON-RPC transport for the lending-platform indexer.
//!
//! - [`HttpChainClient`]: `ChainClient` over HTTP with per-call timeouts
//! - [`HttpConnector`]: builds and checks fresh clients for recovery
//! - [`request`] / [`wire`]: JSON-RPC and node response shapes

pub mod client;
pub mod error;
pub mod request;
pub mod wire;

pub use client::{HttpChainClient, HttpClientConfig, HttpConnector};
pub use error::TransportError;
pub use request::{JsonRpcRequest, JsonRpcResponse, RpcId};
