//! Fluent builder API for assembling an indexer.
//!
//! # Example
//!
//! ```rust,no_run
//! use lendindex_evm::IndexerBuilder;
//!
//! # fn example() -> Result<(), lendindex_core::IndexerError> {
//! let service = IndexerBuilder::new()
//!     .rpc_url("https://saga.example/rpc")
//!     .vault("0x5FbDB2315678afecb367f032d93F642f64180aa3")
//!     .loan_manager("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512")
//!     .dpo_token("0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0")
//!     .batch_size(10)
//!     .build()?;
//! let handle = service.start();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use lendindex_core::{
    ChainConnector, CheckpointManager, CheckpointStore, ContractConfig, ContractRole, EventStore,
    IndexerConfig, IndexerError, NotificationRelay, NullRelay,
};
use lendindex_rpc::{HttpClientConfig, HttpConnector};
use lendindex_storage::InMemoryStorage;

use crate::processor::LogProcessor;
use crate::recovery::RecoveryController;
use crate::scanner::BlockScanner;
use crate::service::IndexerService;
use crate::watcher::LogWatcher;

/// Fluent builder for [`IndexerConfig`] and [`IndexerService`].
///
/// Storage defaults to [`InMemoryStorage`], the relay to [`NullRelay`], and
/// the connector to an [`HttpConnector`] on `rpc_url`.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
    events: Option<Arc<dyn EventStore>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    relay: Option<Arc<dyn NotificationRelay>>,
    connector: Option<Arc<dyn ChainConnector>>,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: IndexerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Set the indexer ID (used for checkpoint keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the chain slug.
    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.config.rpc_url = url.into();
        self
    }

    /// First block to scan when no checkpoint exists.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = Some(block);
        self
    }

    /// Set the number of blocks per batch.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Total attempts per scan cycle, including the first.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn call_timeout_ms(mut self, ms: u64) -> Self {
        self.config.call_timeout_ms = ms;
        self
    }

    /// Follow new contract logs between scans, polling every `interval_ms`.
    pub fn live_events(mut self, interval_ms: u64) -> Self {
        self.config.live_events = true;
        self.config.live_poll_interval_ms = interval_ms;
        self
    }

    /// Watch a contract with its role's default event bindings.
    pub fn contract(mut self, role: ContractRole, address: impl Into<String>) -> Self {
        self.config.contracts.push(ContractConfig::new(role, address));
        self
    }

    pub fn vault(self, address: impl Into<String>) -> Self {
        self.contract(ContractRole::Vault, address)
    }

    pub fn loan_manager(self, address: impl Into<String>) -> Self {
        self.contract(ContractRole::LoanManager, address)
    }

    pub fn dpo_token(self, address: impl Into<String>) -> Self {
        self.contract(ContractRole::DpoToken, address)
    }

    /// Use one backend for both events and checkpoints.
    pub fn storage<S>(mut self, storage: Arc<S>) -> Self
    where
        S: EventStore + CheckpointStore + 'static,
    {
        self.events = Some(storage.clone());
        self.checkpoints = Some(storage);
        self
    }

    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.events = Some(store);
        self
    }

    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn relay(mut self, relay: Arc<dyn NotificationRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Replace the default HTTP connector.
    pub fn connector(mut self, connector: Arc<dyn ChainConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the configuration and wire up the service.
    pub fn build(self) -> Result<IndexerService, IndexerError> {
        let registry = Arc::new(self.config.registry()?);

        let connector = match self.connector {
            Some(connector) => connector,
            None => {
                if self.config.rpc_url.trim().is_empty() {
                    return Err(IndexerError::Config("rpc_url must be set".into()));
                }
                Arc::new(HttpConnector::new(
                    self.config.rpc_url.clone(),
                    HttpClientConfig::with_call_timeout(self.config.call_timeout()),
                ))
            }
        };

        let memory = Arc::new(InMemoryStorage::new());
        let events: Arc<dyn EventStore> = match self.events {
            Some(store) => store,
            None => memory.clone(),
        };
        let checkpoints: Arc<dyn CheckpointStore> = match self.checkpoints {
            Some(store) => store,
            None => memory,
        };
        let relay = self.relay.unwrap_or_else(|| Arc::new(NullRelay));

        let processor = LogProcessor::new(registry, events, relay);
        let watcher = self
            .config
            .live_events
            .then(|| LogWatcher::new(processor.clone()));
        let checkpoint =
            CheckpointManager::new(checkpoints, self.config.chain.clone(), self.config.id.clone());
        let scanner = BlockScanner::new(processor, checkpoint, self.config.batch_size);
        let recovery = RecoveryController::new(
            connector,
            self.config.max_attempts,
            self.config.retry_delay(),
        );

        Ok(IndexerService::with_watcher(self.config, scanner, recovery, watcher))
    }
}
