//! Circuit breaker guarding calls to the search backend
//!
//! After `failure_threshold` consecutive failures the circuit opens and every call is routed to
//! the fallback without touching the backend. Once `reset_timeout` has passed since the last
//! failure the next call moves the circuit to HalfOpen, where a limited number of probe calls
//! decide whether it closes again or reopens.

use crate::error::{SearchError, SearchResult};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing fast
    Open,
    /// Probing whether the backend recovered
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time since the last failure before a probe is allowed
    pub reset_timeout: Duration,
    /// Probe calls admitted while HalfOpen
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

/// Why the fallback path was taken
#[derive(Debug, Clone)]
pub enum FallbackReason {
    /// The circuit is open and the reset timeout has not elapsed
    CircuitOpen,
    /// HalfOpen and every probe slot is taken
    ProbeBudgetExhausted,
    /// The operation ran and failed
    OperationFailed(SearchError),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::CircuitOpen => f.write_str("circuit open"),
            FallbackReason::ProbeBudgetExhausted => f.write_str("circuit half-open, probe budget exhausted"),
            FallbackReason::OperationFailed(err) => write!(f, "operation failed: {}", err),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    half_open_probes: u32,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            half_open_probes: 0,
        }
    }
}

enum Admission {
    Admitted { probe: bool },
    Rejected(FallbackReason),
}

/// Failure-isolation state machine shared by every search issued from one client
pub struct CircuitBreaker {
    inner: Mutex<BreakerState>,
    config: CircuitBreakerConfig,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(BreakerState::closed()),
            config,
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    /// Get current circuit state
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Run `operation` if the circuit admits it, otherwise run `fallback`.
    ///
    /// The fallback also runs when the operation fails. An `Aborted` operation is reported
    /// as-is and leaves the breaker untouched.
    pub async fn execute<F, Fut, FB, FbFut, T>(&self, operation: F, fallback: FB) -> SearchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SearchResult<T>>,
        FB: FnOnce(FallbackReason) -> FbFut,
        FbFut: Future<Output = SearchResult<T>>,
    {
        let probe = match self.admit().await {
            Admission::Admitted { probe } => probe,
            Admission::Rejected(reason) => {
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                debug!("Circuit breaker: call rejected ({})", reason);
                return fallback(reason).await;
            }
        };

        match operation().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(err) if err.is_cancellation() => {
                if probe {
                    self.release_probe().await;
                }
                Err(err)
            }
            Err(err) => {
                self.record_failure(&err).await;
                fallback(FallbackReason::OperationFailed(err)).await
            }
        }
    }

    /// Force the circuit back to Closed and clear all counters
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        let old_state = inner.state;
        *inner = BreakerState::closed();
        if old_state != CircuitState::Closed {
            info!("Circuit breaker: Reset from {:?} to Closed", old_state);
        }
    }

    /// Get breaker statistics
    pub async fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock().await;
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_probes: inner.half_open_probes,
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    async fn admit(&self) -> Admission {
        let mut inner = self.inner.lock().await;

        if inner.state == CircuitState::Open {
            let cooled_down = inner
                .last_failure_at
                .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
            if !cooled_down {
                return Admission::Rejected(FallbackReason::CircuitOpen);
            }
            inner.state = CircuitState::HalfOpen;
            inner.half_open_probes = 0;
            info!("Circuit breaker: Transitioned from Open to HalfOpen");
        }

        match inner.state {
            CircuitState::Closed => Admission::Admitted { probe: false },
            CircuitState::HalfOpen if inner.half_open_probes < self.config.half_open_max_calls => {
                inner.half_open_probes += 1;
                debug!(
                    "Circuit breaker: Admitting probe {}/{}",
                    inner.half_open_probes, self.config.half_open_max_calls
                );
                Admission::Admitted { probe: true }
            }
            CircuitState::HalfOpen => Admission::Rejected(FallbackReason::ProbeBudgetExhausted),
            CircuitState::Open => Admission::Rejected(FallbackReason::CircuitOpen),
        }
    }

    async fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().await;

        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                *inner = BreakerState::closed();
                info!("Circuit breaker: Transitioned from HalfOpen to Closed");
            }
            CircuitState::Open => {
                // A probe admitted before another probe reopened the circuit
                debug!("Circuit breaker: Ignoring late success while Open");
            }
        }
    }

    async fn record_failure(&self, err: &SearchError) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().await;

        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                warn!(
                    "Circuit breaker: Failure recorded ({}/{}): {}",
                    inner.consecutive_failures, self.config.failure_threshold, err
                );
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!("Circuit breaker: Transitioned from Closed to Open");
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.half_open_probes = 0;
                warn!("Circuit breaker: Probe failed, transitioned from HalfOpen to Open: {}", err);
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: Additional failure while Open (consecutive: {})",
                    inner.consecutive_failures
                );
            }
        }
    }

    async fn release_probe(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_probes = inner.half_open_probes.saturating_sub(1);
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Circuit breaker statistics for monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_probes: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn failing() -> SearchResult<u32> {
        Err(SearchError::Upstream { status: 503, message: "unavailable".to_string() })
    }

    async fn fallback(reason: FallbackReason) -> SearchResult<u32> {
        match reason {
            FallbackReason::OperationFailed(err) => Err(err),
            other => Err(SearchError::Degraded(other.to_string())),
        }
    }

    async fn open_breaker(cb: &CircuitBreaker, failures: u32) {
        for _ in 0..failures {
            let _ = cb.execute(|| async { failing() }, fallback).await;
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_initial_state() {
        let cb = CircuitBreaker::new();
        assert_eq!(cb.state().await, CircuitState::Closed);

        let result = cb.execute(|| async { Ok(7) }, fallback).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        open_breaker(&cb, 2).await;
        assert_eq!(cb.state().await, CircuitState::Closed);

        open_breaker(&cb, 1).await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        open_breaker(&cb, 2).await;
        cb.execute(|| async { Ok(1) }, fallback).await.unwrap();
        open_breaker(&cb, 2).await;

        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.stats().await.consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_operation() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });
        open_breaker(&cb, 2).await;

        let counter = AtomicU32::new(0);
        let calls = &counter;
        tokio::time::advance(Duration::from_secs(29)).await;
        let result = cb
            .execute(
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                },
                fallback,
            )
            .await;

        assert!(matches!(result, Err(SearchError::Degraded(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().await.total_rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes_circuit() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_millis(100),
            ..Default::default()
        });
        open_breaker(&cb, 2).await;

        tokio::time::advance(Duration::from_millis(150)).await;
        let result = cb.execute(|| async { Ok(42) }, fallback).await;

        assert_eq!(result.unwrap(), 42);
        let stats = cb.stats().await;
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_millis(100),
            ..Default::default()
        });
        open_breaker(&cb, 2).await;

        tokio::time::advance(Duration::from_millis(150)).await;
        open_breaker(&cb, 1).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        // The reopened circuit waits a full reset timeout again
        tokio::time::advance(Duration::from_millis(50)).await;
        let result = cb.execute(|| async { Ok(1) }, fallback).await;
        assert!(matches!(result, Err(SearchError::Degraded(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_budget() {
        let cb = std::sync::Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(100),
            half_open_max_calls: 2,
        }));
        open_breaker(&cb, 1).await;
        tokio::time::advance(Duration::from_millis(150)).await;

        let slow_probe = |cb: std::sync::Arc<CircuitBreaker>| {
            tokio::spawn(async move {
                cb.execute(
                    || async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(1)
                    },
                    fallback,
                )
                .await
            })
        };
        let first = slow_probe(cb.clone());
        let second = slow_probe(cb.clone());
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let rejected = cb.execute(|| async { Ok(1) }, |reason| async move {
            assert!(matches!(reason, FallbackReason::ProbeBudgetExhausted));
            Ok(0)
        });
        assert_eq!(rejected.await.unwrap(), 0);

        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(second.await.unwrap().unwrap(), 1);
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_call_is_neutral() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(100),
            half_open_max_calls: 1,
        });
        open_breaker(&cb, 1).await;
        tokio::time::advance(Duration::from_millis(150)).await;

        let counter = AtomicU32::new(0);
        let fallback_called = &counter;
        let result: SearchResult<u32> = cb
            .execute(
                || async { Err(SearchError::Aborted) },
                |_| async move {
                    fallback_called.fetch_add(1, Ordering::SeqCst);
                    Ok(0)
                },
            )
            .await;

        assert!(matches!(result, Err(SearchError::Aborted)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // The probe slot was released, so the next call is admitted
        let stats = cb.stats().await;
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.half_open_probes, 0);
        assert_eq!(cb.execute(|| async { Ok(5) }, fallback).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_reset() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        open_breaker(&cb, 1).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        cb.reset().await;
        let stats = cb.stats().await;
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
    }
}
