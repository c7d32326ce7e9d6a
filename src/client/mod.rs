//! Client-side search pipeline
//!
//! [`SearchOrchestrator`] debounces input and drives a [`SearchClient`], which layers the result
//! cache, the [`CircuitBreaker`] and the [`RetryExecutor`] over a [`SearchTransport`].

pub mod circuit_breaker;
pub mod orchestrator;
pub mod retry;
pub mod search_client;
pub mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, FallbackReason};
pub use orchestrator::{OrchestratorConfig, SearchEvent, SearchListener, SearchOrchestrator, SearchState};
pub use retry::{RetryAttempt, RetryConfig, RetryExecutor};
pub use search_client::{SearchClient, SearchOutcome};
pub use transport::{HttpSearchTransport, SearchTransport};
