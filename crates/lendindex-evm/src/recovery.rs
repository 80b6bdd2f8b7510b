//! Retry/recovery controller.
//!
//! Runs an operation against the current [`ChainClient`] up to
//! `max_attempts` times. Before every retry it sleeps `retry_delay` and
//! replaces the client with a fresh one from the [`ChainConnector`]. A failed
//! reconnect uses up an attempt just like a failed operation. A cancelled run
//! gives up before its next retry with [`IndexerError::Stopped`].

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use lendindex_core::{ChainClient, ChainConnector, IndexerError};

pub struct RecoveryController {
    connector: Arc<dyn ChainConnector>,
    client: RwLock<Option<Arc<dyn ChainClient>>>,
    max_attempts: u32,
    retry_delay: Duration,
    interrupt: Notify,
}

impl RecoveryController {
    pub fn new(
        connector: Arc<dyn ChainConnector>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            connector,
            client: RwLock::new(None),
            max_attempts: max_attempts.max(1),
            retry_delay,
            interrupt: Notify::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The live client, connecting first if there is none.
    pub async fn client(&self) -> Result<Arc<dyn ChainClient>, IndexerError> {
        let current = self.client.read().unwrap().clone();
        if let Some(client) = current {
            return Ok(client);
        }
        let client = self.connector.connect().await?;
        *self.client.write().unwrap() = Some(client.clone());
        Ok(client)
    }

    /// Tear down the current client and build a new one.
    pub async fn reconnect(&self) -> Result<Arc<dyn ChainClient>, IndexerError> {
        self.client.write().unwrap().take();
        self.client().await
    }

    /// Cut short a retry delay in progress.
    pub fn interrupt(&self) {
        self.interrupt.notify_waiters();
    }

    /// Run `op` with bounded retries.
    ///
    /// `on_backoff` fires with the upcoming attempt number before each
    /// retry delay. `cancelled` is checked before the delay and again before
    /// reconnecting; once it returns `true` the run ends with
    /// [`IndexerError::Stopped`]. On exhaustion returns
    /// [`IndexerError::RetryExhausted`] carrying the last failure.
    pub async fn run<T, F, Fut>(
        &self,
        mut op: F,
        on_backoff: impl Fn(u32),
        cancelled: impl Fn() -> bool,
    ) -> Result<T, IndexerError>
    where
        F: FnMut(Arc<dyn ChainClient>) -> Fut,
        Fut: Future<Output = Result<T, IndexerError>>,
    {
        let mut last_error: Option<IndexerError> = None;

        for attempt in 1..=self.max_attempts {
            let client = if attempt == 1 {
                self.client().await
            } else {
                if cancelled() {
                    info!(attempt, "retry abandoned, stop requested");
                    return Err(IndexerError::Stopped);
                }
                on_backoff(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(self.retry_delay) => {}
                    _ = self.interrupt.notified() => {}
                }
                if cancelled() {
                    info!(attempt, "retry abandoned, stop requested");
                    return Err(IndexerError::Stopped);
                }
                let client = self.reconnect().await;
                if client.is_ok() {
                    info!(attempt, "reconnected to chain");
                }
                client
            };

            let result = match client {
                Ok(client) => op(client).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(attempt, max = self.max_attempts, error = %e, "attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        error!(attempts = self.max_attempts, last = %last, "retries exhausted");
        Err(IndexerError::RetryExhausted {
            attempts: self.max_attempts,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn controller(connector: Arc<MockConnector>, attempts: u32) -> RecoveryController {
        RecoveryController::new(connector, attempts, Duration::ZERO)
    }

    async fn head(rc: &RecoveryController) -> Result<u64, IndexerError> {
        rc.run(|c| async move { c.latest_height().await }, |_| {}, || false)
            .await
    }

    #[tokio::test]
    async fn first_success_needs_no_retry() {
        let connector = Arc::new(MockConnector::new(Arc::new(MockChain::new(7))));
        let rc = controller(connector.clone(), 3);

        assert_eq!(head(&rc).await.unwrap(), 7);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let chain = Arc::new(MockChain::new(7));
        chain.fail_heads(2);
        let connector = Arc::new(MockConnector::new(chain));
        let rc = controller(connector.clone(), 3);
        let backoffs = AtomicU32::new(0);

        let head = rc
            .run(
                |c| async move { c.latest_height().await },
                |_| {
                    backoffs.fetch_add(1, Ordering::SeqCst);
                },
                || false,
            )
            .await;
        assert_eq!(head.unwrap(), 7);
        assert_eq!(backoffs.load(Ordering::SeqCst), 2);
        // Initial connect plus one rebuild per retry.
        assert_eq!(connector.connects(), 3);
    }

    #[tokio::test]
    async fn exhaustion_after_max_attempts() {
        let chain = Arc::new(MockChain::new(7));
        chain.fail_heads(3);
        let rc = controller(Arc::new(MockConnector::new(chain)), 3);

        let err = head(&rc).await.unwrap_err();
        match err {
            IndexerError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failed_reconnect_counts_as_attempt() {
        let chain = Arc::new(MockChain::new(7));
        chain.fail_heads(1);
        let connector = Arc::new(MockConnector::new(chain));
        let rc = controller(connector.clone(), 3);
        rc.client().await.unwrap();
        connector.fail_connects(2);

        let err = head(&rc).await.unwrap_err();
        assert!(matches!(err, IndexerError::RetryExhausted { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_retry_delay_between_attempts() {
        let chain = Arc::new(MockChain::new(7));
        chain.fail_heads(1);
        let rc = RecoveryController::new(
            Arc::new(MockConnector::new(chain)),
            3,
            Duration::from_secs(5),
        );
        let started = tokio::time::Instant::now();
        head(&rc).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancelled_run_does_not_reconnect() {
        let chain = Arc::new(MockChain::new(7));
        chain.fail_heads(1);
        let connector = Arc::new(MockConnector::new(chain));
        let rc = controller(connector.clone(), 3);

        let err = rc
            .run(|c| async move { c.latest_height().await }, |_| {}, || true)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Stopped));
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_cuts_the_retry_delay() {
        let chain = Arc::new(MockChain::new(7));
        chain.fail_heads(1);
        let rc = Arc::new(RecoveryController::new(
            Arc::new(MockConnector::new(chain)),
            3,
            Duration::from_secs(60),
        ));
        let stopped = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let task = {
            let rc = rc.clone();
            let stopped = stopped.clone();
            tokio::spawn(async move {
                rc.run(
                    |c| async move { c.latest_height().await },
                    |_| {},
                    || stopped.load(Ordering::SeqCst),
                )
                .await
            })
        };
        let started = tokio::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        stopped.store(true, Ordering::SeqCst);
        rc.interrupt();

        assert!(matches!(task.await.unwrap(), Err(IndexerError::Stopped)));
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
