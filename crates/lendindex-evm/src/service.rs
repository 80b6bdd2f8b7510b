//! The indexer service: owns the polling loop and exposes its lifecycle.
//!
//! ```text
//! start()/run()
//!   └─ initialize: checkpoint ▸ start_block ▸ chain head
//!   └─ every poll_interval:
//!        tick() ── guard ──► RecoveryController::run(BlockScanner::scan_cycle)
//!                               ├─ Ok     → Idle
//!                               └─ Err    → Stopped (fail-stop, no restart)
//!   └─ every live_poll_interval (when a LogWatcher is attached):
//!        LogWatcher::poll ── errors logged, scanning unaffected
//! ```
//!
//! Once `stop()` has set `Stopped` nothing moves the state away from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use lendindex_core::{IndexerConfig, IndexerError, IndexerStatus, ScannerState};

use crate::recovery::RecoveryController;
use crate::scanner::{BlockScanner, ScanReport};
use crate::watcher::LogWatcher;

struct Inner {
    config: IndexerConfig,
    scanner: BlockScanner,
    recovery: RecoveryController,
    watcher: Option<LogWatcher>,
    running: AtomicBool,
    scanning: AtomicBool,
    state: Mutex<ScannerState>,
    shutdown: Notify,
}

/// Handle to a running (or runnable) indexer. Cheap to clone.
#[derive(Clone)]
pub struct IndexerService {
    inner: Arc<Inner>,
}

impl IndexerService {
    pub fn new(config: IndexerConfig, scanner: BlockScanner, recovery: RecoveryController) -> Self {
        Self::with_watcher(config, scanner, recovery, None)
    }

    /// Like [`new`](Self::new), with an optional live log feed polled between
    /// scan ticks.
    pub fn with_watcher(
        config: IndexerConfig,
        scanner: BlockScanner,
        recovery: RecoveryController,
        watcher: Option<LogWatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                scanner,
                recovery,
                watcher,
                running: AtomicBool::new(false),
                scanning: AtomicBool::new(false),
                state: Mutex::new(ScannerState::Idle),
                shutdown: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.inner.config
    }

    pub fn scanner(&self) -> &BlockScanner {
        &self.inner.scanner
    }

    pub fn watcher(&self) -> Option<&LogWatcher> {
        self.inner.watcher.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ScannerState {
        *self.inner.state.lock().unwrap()
    }

    pub fn status(&self) -> IndexerStatus {
        IndexerStatus {
            is_running: self.is_running(),
            last_processed_block: self.inner.scanner.last_processed_block(),
            state: self.state(),
        }
    }

    /// Spawn [`run`](Self::run) on the Tokio runtime.
    pub fn start(&self) -> JoinHandle<Result<(), IndexerError>> {
        let svc = self.clone();
        tokio::spawn(async move { svc.run().await })
    }

    /// Drive the polling loop on the current task until stopped.
    ///
    /// Returns `Ok(())` after [`stop`](Self::stop) and the fatal error after a
    /// fail-stop.
    pub async fn run(&self) -> Result<(), IndexerError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!(id = %self.inner.config.id, "indexer already running");
            return Ok(());
        }
        self.set_state(ScannerState::Idle);

        let cfg = &self.inner.config;
        info!(
            id = %cfg.id,
            chain = %cfg.chain,
            batch_size = cfg.batch_size,
            poll_ms = cfg.poll_interval_ms,
            "indexer starting"
        );

        match self.initialize().await {
            Ok(_) => {}
            Err(IndexerError::Stopped) => return Ok(()),
            Err(e) => {
                self.halt();
                error!(error = %e, "indexer failed to initialize");
                return Err(e);
            }
        }

        let mut ticker = tokio::time::interval(cfg.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let watching = self.inner.watcher.is_some();
        let mut live = tokio::time::interval(cfg.live_poll_interval());
        live.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let scan = tokio::select! {
                _ = ticker.tick() => true,
                _ = live.tick(), if watching => false,
                _ = self.inner.shutdown.notified() => true,
            };
            if !self.is_running() {
                break;
            }
            if !scan {
                self.poll_live().await;
                continue;
            }
            match self.tick().await {
                Ok(_) => {}
                Err(IndexerError::Stopped) => break,
                Err(e) => return Err(e),
            }
        }

        info!(
            last_processed_block = self.inner.scanner.last_processed_block(),
            "indexer stopped"
        );
        Ok(())
    }

    /// Request a graceful stop. An in-flight scan finishes first.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            info!(id = %self.inner.config.id, "stop requested");
        }
        self.set_state(ScannerState::Stopped);
        self.inner.shutdown.notify_one();
        self.inner.recovery.interrupt();
    }

    /// Pick the starting watermark.
    ///
    /// A saved checkpoint wins, then `start_block`, then the current head
    /// (historical blocks are not backfilled in that case).
    pub async fn initialize(&self) -> Result<u64, IndexerError> {
        let scanner = &self.inner.scanner;
        let last = if let Some(cp) = scanner.checkpoint().load().await? {
            info!(block = cp.block_number, "resuming from checkpoint");
            cp.block_number
        } else if let Some(start) = self.inner.config.start_block {
            info!(start_block = start, "starting from configured block");
            start.saturating_sub(1)
        } else {
            let head = self
                .inner
                .recovery
                .run(
                    |client| async move { client.latest_height().await },
                    |_| {
                        self.set_state_unless_stopped(ScannerState::Backoff);
                    },
                    || self.state() == ScannerState::Stopped,
                )
                .await?;
            info!(head, "no checkpoint, starting at chain head");
            head
        };
        scanner.resume_from(last);
        self.set_state_unless_stopped(ScannerState::Idle);
        Ok(last)
    }

    /// One guarded scan cycle with recovery.
    ///
    /// Returns `Ok(None)` when a scan is already in flight. Exhausted retries
    /// stop the service.
    pub async fn tick(&self) -> Result<Option<ScanReport>, IndexerError> {
        if self.state() == ScannerState::Stopped {
            return Err(IndexerError::Stopped);
        }
        if self
            .inner
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("scan already in progress, skipping tick");
            return Ok(None);
        }
        if !self.set_state_unless_stopped(ScannerState::Scanning) {
            self.inner.scanning.store(false, Ordering::Release);
            return Err(IndexerError::Stopped);
        }

        let scanner = &self.inner.scanner;
        let delay_ms = self.inner.config.retry_delay_ms;
        let result = self
            .inner
            .recovery
            .run(
                |client| async move { scanner.scan_cycle(client.as_ref()).await },
                |attempt| {
                    self.set_state_unless_stopped(ScannerState::Backoff);
                    warn!(attempt, delay_ms, "backing off before retry");
                },
                || self.state() == ScannerState::Stopped,
            )
            .await;
        self.inner.scanning.store(false, Ordering::Release);

        match result {
            Ok(report) => {
                self.set_state_unless_stopped(ScannerState::Idle);
                Ok(Some(report))
            }
            Err(IndexerError::Stopped) => {
                info!(
                    last_processed_block = scanner.last_processed_block(),
                    "scan abandoned, indexer stopped"
                );
                Err(IndexerError::Stopped)
            }
            Err(e) => {
                self.halt();
                error!(
                    error = %e,
                    last_processed_block = scanner.last_processed_block(),
                    "indexer halted"
                );
                Err(e)
            }
        }
    }

    /// One live-feed poll on the current client. Failures are logged and left
    /// for the next scan tick to cover.
    async fn poll_live(&self) {
        let Some(watcher) = &self.inner.watcher else {
            return;
        };
        let client = match self.inner.recovery.client().await {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "live log poll skipped, no chain client");
                return;
            }
        };
        match watcher.poll(client.as_ref()).await {
            Ok(report) if report.events_stored > 0 => {
                info!(
                    from = report.from,
                    to = report.to,
                    stored = report.events_stored,
                    "live events stored"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "live log poll failed"),
        }
    }

    fn halt(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.set_state(ScannerState::Stopped);
    }

    fn set_state(&self, state: ScannerState) {
        *self.inner.state.lock().unwrap() = state;
    }

    /// Returns `false` when the state was already `Stopped`.
    fn set_state_unless_stopped(&self, state: ScannerState) -> bool {
        let mut current = self.inner.state.lock().unwrap();
        if *current == ScannerState::Stopped {
            return false;
        }
        *current = state;
        true
    }
}
