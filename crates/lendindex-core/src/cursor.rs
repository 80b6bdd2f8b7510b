//! Scan cursor: the indexer's watermark in the chain.

use serde::{Deserialize, Serialize};

/// The highest block height confirmed fully processed.
///
/// The watermark only ever moves forward; attempts to move it backwards or
/// sideways are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    last_processed_block: u64,
}

impl ScanCursor {
    /// Create a cursor whose watermark is `last_processed_block`.
    pub fn new(last_processed_block: u64) -> Self {
        Self {
            last_processed_block,
        }
    }

    pub fn last_processed_block(&self) -> u64 {
        self.last_processed_block
    }

    /// Returns the next block to process (watermark + 1).
    pub fn next_block(&self) -> u64 {
        self.last_processed_block + 1
    }

    /// Move the watermark to `block_number`.
    ///
    /// Returns `false` (and leaves the cursor untouched) unless
    /// `block_number` is strictly above the current watermark.
    pub fn advance(&mut self, block_number: u64) -> bool {
        if block_number <= self.last_processed_block {
            return false;
        }
        self.last_processed_block = block_number;
        true
    }

    /// The inclusive range still to scan given the chain `head`, if any.
    pub fn pending(&self, head: u64) -> Option<BlockRange> {
        let from = self.next_block();
        (head >= from).then_some(BlockRange { from, to: head })
    }
}

/// An inclusive range of block heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks in the range.
    pub fn len(&self) -> u64 {
        if self.to < self.from {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into consecutive sub-ranges of at most `batch_size` blocks.
    pub fn batches(&self, batch_size: u64) -> Vec<BlockRange> {
        let size = batch_size.max(1);
        let mut out = Vec::new();
        let mut start = self.from;
        while start <= self.to {
            let end = start.saturating_add(size - 1).min(self.to);
            out.push(BlockRange::new(start, end));
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        out
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}
