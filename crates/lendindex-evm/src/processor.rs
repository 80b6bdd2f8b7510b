//! Transaction/log processor.
//!
//! Turns one block into stored events:
//!
//! ```text
//! Block ── tx.to known? ──► receipt ──► logs ──► classify ──► upsert ──► relay
//! ```
//!
//! Faults are captured per transaction. A receipt that cannot be fetched
//! (missing, undecodable, RPC error, timeout) is logged and skipped, and
//! sibling transactions and later blocks are still indexed. A log that
//! cannot be decoded is counted and skipped on its own. Only storage faults
//! abort the block.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use lendindex_core::{
    Block, ChainClient, ChainEvent, ContractRegistry, EventStore, IndexerError, Log, Notification,
    NotificationRelay, Transaction,
};

/// Counters for a single transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TxOutcome {
    pub events_stored: usize,
    pub duplicates: usize,
    pub notifications: usize,
    pub malformed_logs: usize,
}

/// Counters for one processed block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockReport {
    pub block_number: u64,
    /// Transactions addressed to a watched contract.
    pub transactions_matched: usize,
    pub events_stored: usize,
    pub duplicates: usize,
    /// Notifications handed to at least one live subscriber.
    pub notifications: usize,
    /// Transactions skipped because their receipt could not be used.
    pub tx_failures: usize,
    /// Receipt logs skipped because the node sent them malformed.
    pub malformed_logs: usize,
}

impl BlockReport {
    fn absorb(&mut self, tx: TxOutcome) {
        self.events_stored += tx.events_stored;
        self.duplicates += tx.duplicates;
        self.notifications += tx.notifications;
        self.malformed_logs += tx.malformed_logs;
    }
}

/// Classifies and persists the logs of watched transactions.
#[derive(Clone)]
pub struct LogProcessor {
    registry: Arc<ContractRegistry>,
    store: Arc<dyn EventStore>,
    relay: Arc<dyn NotificationRelay>,
}

impl LogProcessor {
    pub fn new(
        registry: Arc<ContractRegistry>,
        store: Arc<dyn EventStore>,
        relay: Arc<dyn NotificationRelay>,
    ) -> Self {
        Self {
            registry,
            store,
            relay,
        }
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Process every watched transaction in `block`.
    ///
    /// Returns an error only for faults that must stop the watermark from
    /// moving past this block.
    pub async fn process_block(
        &self,
        client: &dyn ChainClient,
        block: &Block,
    ) -> Result<BlockReport, IndexerError> {
        let mut report = BlockReport {
            block_number: block.number,
            ..Default::default()
        };

        for tx in &block.transactions {
            if !self.is_watched(tx) {
                continue;
            }
            report.transactions_matched += 1;

            match self.process_transaction(client, tx).await {
                Ok(outcome) => report.absorb(outcome),
                Err(e) if is_batch_fatal(&e) => return Err(e),
                Err(e) => {
                    report.tx_failures += 1;
                    warn!(
                        block = block.number,
                        tx = %tx.hash,
                        error = %e,
                        "skipping transaction"
                    );
                }
            }
        }

        if report.events_stored > 0 || report.tx_failures > 0 || report.malformed_logs > 0 {
            debug!(
                block = block.number,
                matched = report.transactions_matched,
                stored = report.events_stored,
                failures = report.tx_failures,
                malformed_logs = report.malformed_logs,
                "block processed"
            );
        }
        Ok(report)
    }

    /// Fetch the receipt of `tx` and store every classified log.
    pub async fn process_transaction(
        &self,
        client: &dyn ChainClient,
        tx: &Transaction,
    ) -> Result<TxOutcome, IndexerError> {
        let receipt = client
            .get_transaction_receipt(&tx.hash)
            .await?
            .ok_or_else(|| IndexerError::ReceiptNotFound(tx.hash.clone()))?;

        let mut outcome = TxOutcome {
            malformed_logs: receipt.malformed_logs.len(),
            ..Default::default()
        };
        for reason in &receipt.malformed_logs {
            warn!(tx = %tx.hash, %reason, "skipping malformed log");
        }
        for log in &receipt.logs {
            self.store_log(log, &mut outcome).await?;
        }
        Ok(outcome)
    }

    /// Classify one log, upsert it and notify its subscriber on first insert.
    ///
    /// Unrecognized logs are ignored. Only a storage failure is an error.
    pub async fn store_log(&self, log: &Log, outcome: &mut TxOutcome) -> Result<(), IndexerError> {
        let Some(event) = self.classify_log(log) else {
            return Ok(());
        };

        if !self.store.upsert_event(&event).await?.is_inserted() {
            outcome.duplicates += 1;
            return Ok(());
        }
        outcome.events_stored += 1;
        debug!(
            event = %event.event_name,
            tx = %event.transaction_hash,
            log_index = event.log_index,
            "event stored"
        );

        if let Some(note) = Notification::for_event(&event, Utc::now()) {
            if self.relay.publish(&note.user_address, &note) > 0 {
                outcome.notifications += 1;
            }
        }
        Ok(())
    }

    /// Build a [`ChainEvent`] for a log the registry recognizes.
    ///
    /// The log is classified by its own emitting address, which may differ
    /// from the transaction's `to`.
    pub fn classify_log(&self, log: &Log) -> Option<ChainEvent> {
        if log.removed {
            return None;
        }
        let topic0 = log.topic0()?;
        let name = self.registry.classify(&log.address, topic0);
        if !name.is_known() {
            return None;
        }
        Some(ChainEvent::from_log(name, log, Utc::now()))
    }

    fn is_watched(&self, tx: &Transaction) -> bool {
        tx.to
            .as_deref()
            .is_some_and(|to| self.registry.is_known_contract(to))
    }
}

/// Node faults on a receipt stay with their transaction. A store that
/// cannot write must not let the watermark move.
fn is_batch_fatal(err: &IndexerError) -> bool {
    matches!(err, IndexerError::Storage(_))
}
