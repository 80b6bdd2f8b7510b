//! HTTP JSON-RPC chain client backed by `reqwest`.
//!
//! Every call is wrapped in an explicit per-call timeout on top of the HTTP
//! client's own request timeout, so a hung node surfaces as
//! [`IndexerError::Timeout`] instead of stalling the scan loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use lendindex_core::types::parse_hex_u64;
use lendindex_core::{Block, ChainClient, ChainConnector, IndexerError, Log, LogFilter, Receipt};

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::wire::{RpcBlock, RpcLog, RpcReceipt};

/// Configuration for [`HttpChainClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Upper bound on one JSON-RPC call, including connection setup.
    pub call_timeout: Duration,
    /// `reqwest` request timeout; should not be shorter than `call_timeout`.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpClientConfig {
    pub fn with_call_timeout(call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            request_timeout: call_timeout.max(Self::default().request_timeout),
        }
    }
}

/// JSON-RPC client for one endpoint.
pub struct HttpChainClient {
    url: String,
    http: reqwest::Client,
    call_timeout: Duration,
    next_id: AtomicU64,
}

impl HttpChainClient {
    /// Create a client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IndexerError::Config(format!("http client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            call_timeout: config.call_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }

    /// Send one request, bounded by the per-call timeout.
    pub async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        match tokio::time::timeout(self.call_timeout, self.send_once(&req)).await {
            Ok(result) => result,
            Err(_) => {
                let ms = self.call_timeout.as_millis() as u64;
                tracing::warn!(method = %req.method, ms, url = %self.url, "RPC call timed out");
                Err(TransportError::Timeout { ms })
            }
        }
    }

    /// Call a method and deserialize the result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self.send(JsonRpcRequest::new(id, method, params)).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        serde_json::from_value(result).map_err(TransportError::Deserialization)
    }

    async fn quantity(&self, method: &str) -> Result<u64, IndexerError> {
        let hex: String = self.call(method, vec![]).await?;
        parse_hex_u64(&hex)
            .ok_or_else(|| IndexerError::malformed(format!("{method}: bad quantity {hex:?}")))
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn latest_height(&self) -> Result<u64, IndexerError> {
        self.quantity("eth_blockNumber").await
    }

    async fn get_block(&self, height: u64) -> Result<Option<Block>, IndexerError> {
        let raw: Option<RpcBlock> = self
            .call("eth_getBlockByNumber", vec![json!(format!("0x{height:x}")), json!(true)])
            .await?;
        raw.map(RpcBlock::into_block).transpose()
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, IndexerError> {
        let raw: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", vec![json!(hash)])
            .await?;
        raw.map(RpcReceipt::into_receipt).transpose()
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<Vec<Log>, IndexerError> {
        let mut params = json!({
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
        });
        if !filter.addresses.is_empty() {
            params["address"] = json!(filter.addresses);
        }
        let raw: Vec<RpcLog> = self.call("eth_getLogs", vec![params]).await?;

        let mut logs = Vec::with_capacity(raw.len());
        for entry in raw {
            let tx = entry.tx_hash.clone();
            match entry.into_log() {
                Ok(log) => logs.push(log),
                Err(e) => tracing::warn!(%tx, error = %e, "skipping malformed log"),
            }
        }
        Ok(logs)
    }

    async fn chain_id(&self) -> Result<u64, IndexerError> {
        self.quantity("eth_chainId").await
    }
}

/// Builds a fresh [`HttpChainClient`] and checks it with `eth_chainId`.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    url: String,
    config: HttpClientConfig,
}

impl HttpConnector {
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Self {
        Self {
            url: url.into(),
            config,
        }
    }
}

#[async_trait]
impl ChainConnector for HttpConnector {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, IndexerError> {
        let client = HttpChainClient::new(self.url.clone(), self.config.clone())?;
        let chain_id = client.chain_id().await?;
        tracing::info!(chain_id, url = %self.url, "connected to chain");
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned JSON-RPC body, then close.
    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let resp = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(resp.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn latest_height_parses_quantity() {
        let url = serve_once(r#"{"jsonrpc":"2.0","id":1,"result":"0x69"}"#).await;
        let client = HttpChainClient::new(url, HttpClientConfig::default()).unwrap();
        assert_eq!(client.latest_height().await.unwrap(), 105);
    }

    #[tokio::test]
    async fn missing_block_is_none() {
        let url = serve_once(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).await;
        let client = HttpChainClient::new(url, HttpClientConfig::default()).unwrap();
        assert!(client.get_block(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn node_error_maps_to_rpc() {
        let url = serve_once(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#,
        )
        .await;
        let client = HttpChainClient::new(url, HttpClientConfig::default()).unwrap();
        let err = client.chain_id().await.unwrap_err();
        assert!(matches!(err, IndexerError::Rpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the socket without answering.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let client = HttpChainClient::new(
            format!("http://{addr}"),
            HttpClientConfig::with_call_timeout(Duration::from_millis(100)),
        )
        .unwrap();
        let err = client.latest_height().await.unwrap_err();
        assert!(matches!(err, IndexerError::Timeout { ms: 100 }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn get_logs_keeps_well_formed_entries() {
        let url = serve_once(
            r#"{"jsonrpc":"2.0","id":1,"result":[
                {"address":"0xvault","topics":["0xsig"],"data":"0x","blockNumber":"0x65",
                 "transactionHash":"0xt1","logIndex":"0x0"},
                {"address":"0xvault","topics":["0xsig"],"data":"0xzz","blockNumber":"0x65",
                 "transactionHash":"0xt2","logIndex":"0x1"}
            ]}"#,
        )
        .await;
        let client = HttpChainClient::new(url, HttpClientConfig::default()).unwrap();
        let logs = client
            .get_logs(101, 101, &LogFilter::addresses(["0xvault"]))
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].transaction_hash, "0xt1");
        assert_eq!(logs[0].block_number, 101);
    }

    #[tokio::test]
    async fn connector_checks_chain_id() {
        let url = serve_once(r#"{"jsonrpc":"2.0","id":1,"result":"0x1b58"}"#).await;
        let connector = HttpConnector::new(url, HttpClientConfig::default());
        assert!(connector.connect().await.is_ok());
    }
}
