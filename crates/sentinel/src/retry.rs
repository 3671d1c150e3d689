//! Retry with exponential backoff for one unit of work.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::entity::UnitIndex;
use crate::error::{LedgerError, Result, SentinelError};

/// Runs a fallible ledger operation, retrying retryable failures.
///
/// Fatal failures return immediately. Backoff sleeps end early on
/// shutdown with [`SentinelError::ShuttingDown`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    cancel: CancellationToken,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Delay after the failed attempt with zero-based index `attempt`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let secs = self
            .config
            .base
            .checked_pow(attempt.saturating_add(self.config.offset))
            .unwrap_or(u64::MAX);
        Duration::from_secs(secs)
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Run `op` until it succeeds, fails fatally or the budget is spent.
    pub async fn execute<T, F, Fut>(&self, unit: UnitIndex, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, LedgerError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(unit, attempt, error = %err, "Fatal error, not retrying");
                return Err(SentinelError::Ledger(err));
            }

            attempt += 1;
            if attempt >= max_attempts {
                warn!(unit, attempts = attempt, error = %err, "Retry budget exhausted");
                return Err(SentinelError::Exhausted {
                    unit,
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = self.backoff_delay(attempt - 1);
            warn!(
                unit,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable error, backing off"
            );

            tokio::select! {
                () = self.cancel.cancelled() => return Err(SentinelError::ShuttingDown),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn executor() -> RetryExecutor {
        RetryExecutor::new(RetryConfig::default(), CancellationToken::new())
    }

    #[test]
    fn test_backoff_schedule() {
        let retry = executor();
        assert_eq!(retry.backoff_delay(0), Duration::from_secs(81));
        assert_eq!(retry.backoff_delay(1), Duration::from_secs(243));

        let huge = RetryExecutor::new(
            RetryConfig {
                max_attempts: 3,
                base: 10,
                offset: 30,
            },
            CancellationToken::new(),
        );
        assert_eq!(huge.backoff_delay(0), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_backoff_with_max_offset_saturates() {
        let retry = RetryExecutor::new(
            RetryConfig {
                max_attempts: 3,
                base: 3,
                offset: u32::MAX,
            },
            CancellationToken::new(),
        );
        assert_eq!(retry.backoff_delay(2), Duration::from_secs(u64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = executor()
            .execute(7, || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(LedgerError::retryable("429"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(81 + 243));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget() {
        let calls = AtomicU32::new(0);
        let err = executor()
            .execute(9, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(LedgerError::retryable("timeout")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err,
            SentinelError::Exhausted {
                unit: 9,
                attempts: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = executor()
            .execute(1, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(LedgerError::fatal("bad request")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, SentinelError::Ledger(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let retry = RetryExecutor::new(RetryConfig::default(), cancel.clone());

        let handle = tokio::spawn(async move {
            retry
                .execute(3, || async { Err::<(), _>(LedgerError::retryable("busy")) })
                .await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SentinelError::ShuttingDown));
    }
}
