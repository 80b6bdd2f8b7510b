//! Block scanner: one pass from the watermark up to the chain head.
//!
//! A scan cycle:
//! 1. asks the node for the latest height,
//! 2. splits `[watermark + 1, head]` into fixed-size batches,
//! 3. processes the blocks of each batch in order,
//! 4. persists the checkpoint and advances the watermark after each batch.
//!
//! Any error aborts the cycle with the watermark left at the last completed
//! batch, so the next attempt starts from the first unfinished block.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info};

use lendindex_core::{BlockRange, ChainClient, CheckpointManager, IndexerError, ScanCursor};

use crate::processor::{BlockReport, LogProcessor};

/// Summary of one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub from: u64,
    pub to: u64,
    pub batches: usize,
    pub blocks: u64,
    pub events_stored: usize,
    pub duplicates: usize,
    pub tx_failures: usize,
    pub malformed_logs: usize,
}

impl ScanReport {
    /// `true` when the cycle found nothing new to scan.
    pub fn is_idle(&self) -> bool {
        self.batches == 0
    }

    fn absorb(&mut self, block: &BlockReport) {
        self.blocks += 1;
        self.events_stored += block.events_stored;
        self.duplicates += block.duplicates;
        self.tx_failures += block.tx_failures;
        self.malformed_logs += block.malformed_logs;
    }
}

pub struct BlockScanner {
    processor: LogProcessor,
    checkpoint: CheckpointManager,
    cursor: Mutex<ScanCursor>,
    batch_size: u64,
}

impl BlockScanner {
    pub fn new(processor: LogProcessor, checkpoint: CheckpointManager, batch_size: u64) -> Self {
        Self {
            processor,
            checkpoint,
            cursor: Mutex::new(ScanCursor::new(0)),
            batch_size: batch_size.max(1),
        }
    }

    pub fn last_processed_block(&self) -> u64 {
        self.cursor.lock().unwrap().last_processed_block()
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    pub fn processor(&self) -> &LogProcessor {
        &self.processor
    }

    /// Seed the watermark before the first cycle.
    pub fn resume_from(&self, last_processed_block: u64) {
        *self.cursor.lock().unwrap() = ScanCursor::new(last_processed_block);
    }

    /// Scan every block between the watermark and the current head.
    pub async fn scan_cycle(&self, client: &dyn ChainClient) -> Result<ScanReport, IndexerError> {
        let head = client.latest_height().await?;
        let cursor = *self.cursor.lock().unwrap();

        let Some(range) = cursor.pending(head) else {
            debug!(head, last = cursor.last_processed_block(), "no new blocks");
            return Ok(ScanReport {
                from: cursor.next_block(),
                to: head,
                ..Default::default()
            });
        };

        let batches = range.batches(self.batch_size);
        info!(from = range.from, to = range.to, batches = batches.len(), "scanning blocks");

        let mut report = ScanReport {
            from: range.from,
            to: range.to,
            ..Default::default()
        };
        for batch in batches {
            self.scan_batch(client, batch, &mut report).await?;
            report.batches += 1;
        }

        info!(
            from = report.from,
            to = report.to,
            stored = report.events_stored,
            duplicates = report.duplicates,
            tx_failures = report.tx_failures,
            malformed_logs = report.malformed_logs,
            "scan cycle complete"
        );
        Ok(report)
    }

    async fn scan_batch(
        &self,
        client: &dyn ChainClient,
        batch: BlockRange,
        report: &mut ScanReport,
    ) -> Result<(), IndexerError> {
        for height in batch.from..=batch.to {
            let block = client
                .get_block(height)
                .await?
                .ok_or(IndexerError::BlockNotFound(height))?;
            let block_report = self.processor.process_block(client, &block).await?;
            report.absorb(&block_report);
        }

        self.checkpoint.save(batch.to).await?;
        self.cursor.lock().unwrap().advance(batch.to);
        debug!(batch = %batch, "batch committed");
        Ok(())
    }
}
