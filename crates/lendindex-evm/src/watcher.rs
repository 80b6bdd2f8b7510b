//! Live contract-log feed.
//!
//! Between scan ticks the watcher asks the node for new logs emitted by the
//! watched contracts (`eth_getLogs`) and runs them through the same
//! classify → upsert → relay path as the block scanner. Whichever of the two
//! stores an event first sends its notification; the other sees a duplicate.
//!
//! The watcher keeps its own in-memory position. It starts at the chain head
//! observed on its first poll and never touches the checkpoint, so the
//! scanner's watermark stays the only durable record of progress.

use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

use lendindex_core::{ChainClient, IndexerError, LogFilter};

use crate::processor::{LogProcessor, TxOutcome};

/// Widest block range requested from `eth_getLogs` in one poll.
pub const MAX_LOG_SPAN: u64 = 1_000;

/// Summary of one live poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchReport {
    pub from: u64,
    pub to: u64,
    pub logs: usize,
    pub events_stored: usize,
    pub duplicates: usize,
    pub notifications: usize,
}

pub struct LogWatcher {
    processor: LogProcessor,
    filter: LogFilter,
    last_seen: Mutex<Option<u64>>,
}

impl LogWatcher {
    pub fn new(processor: LogProcessor) -> Self {
        let filter = LogFilter::addresses(processor.registry().addresses());
        Self {
            processor,
            filter,
            last_seen: Mutex::new(None),
        }
    }

    /// Highest block whose logs have been fetched, if any poll has run.
    pub fn last_seen(&self) -> Option<u64> {
        *self.last_seen.lock().unwrap()
    }

    /// Fetch and store logs for the blocks mined since the previous poll.
    ///
    /// The first call only records the head. At most [`MAX_LOG_SPAN`] blocks
    /// are requested per call.
    pub async fn poll(&self, client: &dyn ChainClient) -> Result<WatchReport, IndexerError> {
        let head = client.latest_height().await?;
        let Some(last) = self.last_seen() else {
            *self.last_seen.lock().unwrap() = Some(head);
            debug!(head, "live log feed anchored at head");
            return Ok(WatchReport {
                from: head + 1,
                to: head,
                ..Default::default()
            });
        };
        if head <= last {
            return Ok(WatchReport {
                from: last + 1,
                to: last,
                ..Default::default()
            });
        }

        let from = last + 1;
        let to = head.min(last + MAX_LOG_SPAN);
        let logs = client.get_logs(from, to, &self.filter).await?;

        let mut outcome = TxOutcome::default();
        for log in &logs {
            self.processor.store_log(log, &mut outcome).await?;
        }
        *self.last_seen.lock().unwrap() = Some(to);

        if outcome.events_stored > 0 {
            debug!(from, to, stored = outcome.events_stored, "live events stored");
        }
        Ok(WatchReport {
            from,
            to,
            logs: logs.len(),
            events_stored: outcome.events_stored,
            duplicates: outcome.duplicates,
            notifications: outcome.notifications,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use lendindex_core::{EventName, EventStore, SubscriptionHub};
    use lendindex_storage::InMemoryStorage;
    use std::sync::Arc;

    fn watcher(store: Arc<InMemoryStorage>, hub: SubscriptionHub) -> LogWatcher {
        LogWatcher::new(LogProcessor::new(Arc::new(registry()), store, Arc::new(hub)))
    }

    #[tokio::test]
    async fn first_poll_anchors_at_head() {
        let chain = MockChain::new(100);
        chain.add_block(100, vec![mined(deposit_log(VAULT, USER, "0xold", 100, 0))]);
        let store = Arc::new(InMemoryStorage::new());
        let w = watcher(store.clone(), SubscriptionHub::new());

        let report = w.poll(&chain).await.unwrap();
        assert_eq!(report.logs, 0);
        assert_eq!(w.last_seen(), Some(100));
        assert_eq!(store.event_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn new_logs_are_stored_and_pushed() {
        let chain = MockChain::new(100);
        let store = Arc::new(InMemoryStorage::new());
        let hub = SubscriptionHub::new();
        let mut sub = hub.subscribe(USER);
        let w = watcher(store.clone(), hub);
        w.poll(&chain).await.unwrap();

        chain.add_block(
            101,
            vec![
                mined(borrow_log(LOANS, USER, "0xloan", 101, 0)),
                mined(borrow_log(STRANGER, USER, "0xelse", 101, 1)),
            ],
        );
        chain.set_head(101);

        let report = w.poll(&chain).await.unwrap();
        assert_eq!((report.from, report.to), (101, 101));
        assert_eq!(report.logs, 1);
        assert_eq!(report.events_stored, 1);
        assert_eq!(sub.try_recv().unwrap().kind, EventName::LoanCreated);
        assert_eq!(w.last_seen(), Some(101));

        // Nothing new: the position holds and nothing is stored twice.
        let again = w.poll(&chain).await.unwrap();
        assert_eq!(again.logs, 0);
        assert_eq!(store.event_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wide_gaps_are_walked_in_spans() {
        let chain = MockChain::new(10);
        let w = watcher(Arc::new(InMemoryStorage::new()), SubscriptionHub::new());
        w.poll(&chain).await.unwrap();

        chain.set_head(10 + MAX_LOG_SPAN + 5);
        let first = w.poll(&chain).await.unwrap();
        assert_eq!((first.from, first.to), (11, 10 + MAX_LOG_SPAN));
        let second = w.poll(&chain).await.unwrap();
        assert_eq!((second.from, second.to), (11 + MAX_LOG_SPAN, 10 + MAX_LOG_SPAN + 5));
    }
}
