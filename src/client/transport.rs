//! HTTP transport to the search backend
//!
//! The strategy picked at construction decides which endpoint a query is routed to.

use crate::error::{SearchError, SearchResult};
use crate::types::{SearchQuery, SearchResultPage, SearchStrategy, SortMode};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

/// One backend call, without retries or timeouts
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> SearchResult<SearchResultPage>;
}

/// Error body returned by the backend on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// reqwest-based transport
pub struct HttpSearchTransport {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    strategy: SearchStrategy,
}

impl HttpSearchTransport {
    pub fn new(endpoint: &str, api_key: Option<String>, strategy: SearchStrategy) -> SearchResult<Self> {
        let mut base_url = Url::parse(endpoint)
            .map_err(|e| SearchError::Config(format!("Invalid search endpoint '{}': {}", endpoint, e)))?;

        // Joining relative paths replaces the last segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("product-search/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            strategy,
        })
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Full URL of the endpoint this transport calls
    pub fn endpoint_url(&self) -> SearchResult<Url> {
        self.base_url
            .join(self.strategy.path())
            .map_err(|e| SearchError::Config(format!("Invalid search path: {}", e)))
    }

    fn query_params(&self, query: &SearchQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![("q", query.text.clone()), ("limit", query.limit.to_string())];

        if let Some(domain) = &query.domain {
            params.push(("domain", domain.clone()));
        }
        if self.strategy == SearchStrategy::Lexical && query.sort == SortMode::Recent {
            params.push(("sort", query.sort.to_string()));
        }
        if let Some(cursor) = &query.cursor {
            params.push(("cursor", cursor.clone()));
        }

        params
    }
}

#[async_trait]
impl SearchTransport for HttpSearchTransport {
    #[instrument(skip(self, query), fields(strategy = ?self.strategy))]
    async fn search(&self, query: &SearchQuery) -> SearchResult<SearchResultPage> {
        let url = self.endpoint_url()?;

        let mut request = self.client.get(url).query(&self.query_params(query));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(SearchError::Unauthorized(
                "The search service rejected the request credentials. Check that SEARCH_API_KEY is set to a valid key."
                    .to_string(),
            ));
        }

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            return Err(SearchError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let page: SearchResultPage = serde_json::from_slice(&body)?;
        debug!("Backend returned {} items (has_more: {})", page.items.len(), page.has_more);
        Ok(page)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SearchError {
    if err.is_timeout() {
        SearchError::Timeout
    } else {
        SearchError::Network(err.to_string())
    }
}
