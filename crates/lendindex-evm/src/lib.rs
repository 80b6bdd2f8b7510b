//! lendindex-evm: scan loop for the lending-platform indexer.
//!
//! - [`LogProcessor`]: watched transactions → receipts → classified events
//! - [`BlockScanner`]: watermark, batching, checkpoints
//! - [`RecoveryController`]: bounded retry with reconnect
//! - [`LogWatcher`]: live contract-log feed between scans
//! - [`IndexerService`]: polling loop, lifecycle, status
//! - [`IndexerBuilder`]: wires it all together

pub mod builder;
pub mod processor;
pub mod recovery;
pub mod scanner;
pub mod service;
pub mod watcher;

#[cfg(test)]
mod test_utils;

pub use builder::IndexerBuilder;
pub use processor::{BlockReport, LogProcessor, TxOutcome};
pub use recovery::RecoveryController;
pub use scanner::{BlockScanner, ScanReport};
pub use service::IndexerService;
pub use watcher::{LogWatcher, WatchReport};
