//! Retry with exponential backoff for backend search calls
//!
//! Every attempt runs under its own timeout and every suspension point (the attempt itself and
//! the backoff sleep) also watches the caller's cancellation token.

use crate::error::{SearchError, SearchResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every following one
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0) added on top of the delay
    pub jitter_factor: f64,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1), // 1s, 2s, 4s
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Bookkeeping for one attempt, only used for logging
#[derive(Debug, Clone, Copy)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub started_at: Instant,
    pub timeout_at: Instant,
}

/// Runs one logical call with per-attempt timeout, bounded retries and cancellation
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic.
    ///
    /// Returns `Aborted` as soon as `cancel` fires, whether an attempt or a backoff sleep is
    /// pending at that moment.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, operation: F) -> SearchResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = SearchResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if cancel.is_cancelled() {
                return Err(SearchError::Aborted);
            }

            let started_at = Instant::now();
            let record = RetryAttempt {
                attempt_number: attempt + 1,
                started_at,
                timeout_at: started_at + self.config.attempt_timeout,
            };
            debug!(?record, "Starting search attempt");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SearchError::Aborted),
                result = timeout(self.config.attempt_timeout, operation()) => {
                    result.unwrap_or_else(|_| Err(SearchError::Timeout))
                }
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!("Not retrying error: {}", error);
                return Err(error);
            }

            if attempt < self.config.max_retries {
                let delay = self.calculate_delay(attempt);
                warn!(
                    "Operation failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt + 1,
                    self.config.max_retries + 1,
                    delay,
                    error
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SearchError::Aborted),
                    _ = sleep(delay) => {}
                }
            } else {
                warn!(
                    "Operation failed after {} attempts: {}",
                    self.config.max_retries + 1,
                    error
                );
            }

            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            SearchError::Internal("Retry logic error: no attempts made".to_string())
        }))
    }

    /// Backoff before retry number `attempt + 1`: `initial_delay * 2^attempt`, capped, plus jitter
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exponential_delay = self
            .config
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.config.max_delay);

        let capped_delay = std::cmp::min(exponential_delay, self.config.max_delay);

        if self.config.jitter_factor > 0.0 {
            let jitter_range = (capped_delay.as_millis() as f64 * self.config.jitter_factor) as u64;
            let jitter = rand::thread_rng().gen_range(0..=jitter_range);
            capped_delay + Duration::from_millis(jitter)
        } else {
            capped_delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let executor = RetryExecutor::default();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = executor
            .execute(&CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<i32, SearchError>(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let executor = RetryExecutor::new(fast_config());
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = executor
            .execute(&CancellationToken::new(), || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SearchError::Network("connection reset".to_string()))
                } else {
                    Ok("page")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "page");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let executor = RetryExecutor::new(fast_config());
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: SearchResult<()> = executor
            .execute(&CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SearchError::Upstream { status: 503, message: "unavailable".to_string() })
            })
            .await;

        assert!(matches!(result, Err(SearchError::Upstream { status: 503, .. })));
        // One attempt plus three retries
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_no_retry_on_client_errors() {
        let executor = RetryExecutor::new(fast_config());
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: SearchResult<()> = executor
            .execute(&CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SearchError::Unauthorized("bad key".to_string()))
            })
            .await;

        assert!(matches!(result, Err(SearchError::Unauthorized(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let executor = RetryExecutor::new(RetryConfig {
            max_retries: 1,
            attempt_timeout: Duration::from_millis(100),
            ..fast_config()
        });
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: SearchResult<()> = executor
            .execute(&CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(SearchError::Timeout)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_attempt() {
        let executor = RetryExecutor::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result: SearchResult<()> = executor
            .execute(&cancel, || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(SearchError::Aborted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff() {
        let executor = RetryExecutor::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        tokio::spawn(async move {
            // Lands inside the first 1s backoff
            sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: SearchResult<()> = executor
            .execute(&cancel, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SearchError::Timeout)
                }
            })
            .await;

        assert!(matches!(result, Err(SearchError::Aborted)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_delay_calculation() {
        let executor = RetryExecutor::new(RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        });

        assert_eq!(executor.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(executor.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(executor.calculate_delay(2), Duration::from_secs(4));
        assert_eq!(executor.calculate_delay(3), Duration::from_secs(5));
        assert_eq!(executor.calculate_delay(40), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_range() {
        let executor = RetryExecutor::new(RetryConfig {
            jitter_factor: 0.5,
            ..Default::default()
        });

        for _ in 0..20 {
            let delay = executor.calculate_delay(0);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1500));
        }
    }
}
