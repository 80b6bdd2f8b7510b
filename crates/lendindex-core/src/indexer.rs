//! Indexer configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::registry::{ContractConfig, ContractRegistry};

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used for checkpoint keys).
    pub id: String,
    /// Chain slug (e.g. `"saga"`).
    pub chain: String,
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// First block to scan when no checkpoint exists. `None` starts at the
    /// chain head observed on startup.
    pub start_block: Option<u64>,
    /// Blocks per batch; the watermark advances once per batch.
    pub batch_size: u64,
    /// Scan tick interval (milliseconds).
    pub poll_interval_ms: u64,
    /// Attempts per scan cycle before the indexer fail-stops.
    pub max_attempts: u32,
    /// Pause before each retry (milliseconds).
    pub retry_delay_ms: u64,
    /// Upper bound on a single RPC call (milliseconds).
    pub call_timeout_ms: u64,
    /// Watched contracts.
    pub contracts: Vec<ContractConfig>,
    /// Also follow new contract logs with `eth_getLogs` between scans, so
    /// notifications go out without waiting for the next scan tick.
    pub live_events: bool,
    /// Live log poll interval (milliseconds).
    pub live_poll_interval_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "lendindex".into(),
            chain: "saga".into(),
            rpc_url: String::new(),
            start_block: None,
            batch_size: 10,
            poll_interval_ms: 30_000,
            max_attempts: 3,
            retry_delay_ms: 5_000,
            call_timeout_ms: 10_000,
            contracts: vec![],
            live_events: false,
            live_poll_interval_ms: 5_000,
        }
    }
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn live_poll_interval(&self) -> Duration {
        Duration::from_millis(self.live_poll_interval_ms)
    }

    /// Check policy values and build the contract registry.
    pub fn registry(&self) -> Result<ContractRegistry, IndexerError> {
        self.validate()?;
        ContractRegistry::from_config(&self.contracts)
    }

    /// Reject settings the scanner cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.batch_size == 0 {
            return Err(IndexerError::Config("batch_size must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(IndexerError::Config("max_attempts must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(IndexerError::Config("poll_interval_ms must be positive".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(IndexerError::Config("call_timeout_ms must be positive".into()));
        }
        if self.live_events && self.live_poll_interval_ms == 0 {
            return Err(IndexerError::Config("live_poll_interval_ms must be positive".into()));
        }
        if self.start_block == Some(0) {
            return Err(IndexerError::Config(
                "start_block must be at least 1; the genesis block is not scanned".into(),
            ));
        }
        if self.id.trim().is_empty() || self.chain.trim().is_empty() {
            return Err(IndexerError::Config("id and chain must be set".into()));
        }
        Ok(())
    }
}

/// Scanner state machine.
///
/// `Idle → Scanning → (Idle | Backoff → Scanning … | Stopped)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerState {
    /// Waiting for the next tick.
    Idle,
    /// A scan cycle is in flight.
    Scanning,
    /// Waiting to retry after a failed cycle.
    Backoff,
    /// Halted by `stop()` or by exhausted retries.
    Stopped,
}

impl std::fmt::Display for ScannerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Backoff => write!(f, "backoff"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Read-only snapshot for health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerStatus {
    pub is_running: bool,
    pub last_processed_block: u64,
    pub state: ScannerState,
}
