//! lendindex-core: foundation for the lending platform's chain indexer.
//!
//! # Architecture
//!
//! ```text
//! IndexerService → BlockScanner
//!                      ├── ChainClient       (latest height, blocks, receipts, logs)
//!                      ├── ScanCursor        (watermark, batch partitioning)
//!                      ├── ContractRegistry  (address + topic0 → EventName)
//!                      ├── EventStore        (idempotent upsert sink)
//!                      ├── CheckpointStore   (watermark persistence)
//!                      └── NotificationRelay (per-wallet push)
//! ```

pub mod checkpoint;
pub mod client;
pub mod cursor;
pub mod error;
pub mod event;
pub mod indexer;
pub mod registry;
pub mod relay;
pub mod store;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore};
pub use client::{ChainClient, ChainConnector};
pub use cursor::{BlockRange, ScanCursor};
pub use error::IndexerError;
pub use event::{ChainEvent, EventName};
pub use indexer::{IndexerConfig, IndexerStatus, ScannerState};
pub use registry::{keccak256_signature, ContractConfig, ContractRegistry, ContractRole};
pub use relay::{Notification, NotificationRelay, NullRelay, Subscription, SubscriptionHub};
pub use store::{EventStore, UpsertOutcome};
pub use types::{Block, Log, LogFilter, Receipt, Transaction};
