//! Cache, circuit breaker and retrying transport composed into one search call

use super::circuit_breaker::{CircuitBreaker, FallbackReason};
use super::retry::{RetryConfig, RetryExecutor};
use super::transport::{HttpSearchTransport, SearchTransport};
use crate::cache::SearchCache;
use crate::config::ClientConfig;
use crate::error::{SearchError, SearchResult};
use crate::types::{SearchQuery, SearchResultPage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Where a page handed back by [`SearchClient::search`] came from
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Fetched from the backend for this call
    Fresh(SearchResultPage),
    /// Served from the cache without a backend call
    Cached(SearchResultPage),
    /// The backend was unavailable and a cached page was served instead
    Degraded(SearchResultPage),
}

impl SearchOutcome {
    pub fn page(&self) -> &SearchResultPage {
        match self {
            SearchOutcome::Fresh(page) | SearchOutcome::Cached(page) | SearchOutcome::Degraded(page) => page,
        }
    }

    pub fn into_page(self) -> SearchResultPage {
        match self {
            SearchOutcome::Fresh(page) | SearchOutcome::Cached(page) | SearchOutcome::Degraded(page) => page,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, SearchOutcome::Degraded(_))
    }
}

/// Resilient search client
pub struct SearchClient {
    transport: Arc<dyn SearchTransport>,
    cache: Arc<SearchCache>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
}

impl SearchClient {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        cache: Arc<SearchCache>,
        breaker: Arc<CircuitBreaker>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            breaker,
            retry: RetryExecutor::new(retry_config),
        }
    }

    /// Build the HTTP-backed client described by `config`
    pub fn from_config(config: &ClientConfig) -> SearchResult<Self> {
        let transport = HttpSearchTransport::new(&config.endpoint, config.api_key.clone(), config.strategy)?;

        info!(
            "Search client targeting {} ({:?} strategy)",
            config.endpoint, config.strategy
        );

        Ok(Self::new(
            Arc::new(transport),
            Arc::new(SearchCache::with_config(config.cache.clone())),
            Arc::new(CircuitBreaker::with_config(config.circuit_breaker.clone())),
            config.retry.clone(),
        ))
    }

    pub fn cache(&self) -> &Arc<SearchCache> {
        &self.cache
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run one search.
    ///
    /// First pages are answered from the cache when possible and written back on success.
    /// Nothing is cached once `cancel` has fired.
    #[instrument(skip(self, query, cancel), fields(query = %crate::observability::sanitize_query(&query.text)))]
    pub async fn search(&self, query: &SearchQuery, cancel: &CancellationToken) -> SearchResult<SearchOutcome> {
        if query.text.is_empty() {
            return Err(SearchError::InvalidRequest("Query text cannot be empty".to_string()));
        }

        let key = query.cache_key();
        let shape = query.page_shape();
        if query.is_first_page() {
            if let Some(page) = self.cache.get(&key, shape).await {
                debug!("Cache hit for {}", key);
                return Ok(SearchOutcome::Cached(page));
            }
        }

        let transport = &self.transport;
        let retry = &self.retry;
        let cache = &self.cache;
        let key_ref = &key;

        let outcome = self
            .breaker
            .execute(
                || async move {
                    retry
                        .execute(cancel, || transport.search(query))
                        .await
                        .map(SearchOutcome::Fresh)
                },
                |reason| async move {
                    // The hit path above already counted this lookup
                    let cached = if query.is_first_page() {
                        cache.peek(key_ref, shape).await
                    } else {
                        None
                    };

                    match (cached, reason) {
                        (Some(page), reason) => {
                            warn!("Serving cached page for {} ({})", key_ref, reason);
                            Ok(SearchOutcome::Degraded(page))
                        }
                        (None, FallbackReason::OperationFailed(err)) => Err(err),
                        (None, reason) => Err(SearchError::Degraded(format!(
                            "search is temporarily unavailable ({}) and no cached results exist",
                            reason
                        ))),
                    }
                },
            )
            .await?;

        if let SearchOutcome::Fresh(page) = &outcome {
            if query.is_first_page() && !cancel.is_cancelled() {
                self.cache.set(key, shape, page.clone()).await;
            }
        }

        Ok(outcome)
    }
}
