//! Backend search strategies
//!
//! Both services take the raw request parameters, apply the shared page-size and total caps, and
//! run their datastore call under the configured query timeout.

pub mod lexical;
pub mod semantic;


use crate::error::{SearchError, SearchResult};
use crate::types::{DEFAULT_BACKEND_LIMIT, MAX_RESULTS};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

pub use lexical::LexicalSearchService;
pub use semantic::SemanticSearchService;

/// Upper bound reported in a page's `total`
pub const TOTAL_CAP: u64 = (MAX_RESULTS * 10) as u64;

/// Query-string parameters shared by both search endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub domain: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

impl SearchParams {
    /// Trimmed query text, empty when absent
    pub fn query_text(&self) -> &str {
        self.q.as_deref().map(str::trim).unwrap_or("")
    }

    /// Trimmed domain filter, `None` when absent or blank
    pub fn domain(&self) -> Option<String> {
        self.domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }

    /// Requested page size: a positive integer, else the default, never above `MAX_RESULTS`
    pub fn page_limit(&self) -> usize {
        let requested = self
            .limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|&l| l > 0)
            .unwrap_or(DEFAULT_BACKEND_LIMIT);
        requested.min(MAX_RESULTS)
    }

    /// Trimmed cursor, `None` when absent or blank
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// Edge cache tag identifying this query, e.g. `search:watch:*`
    pub fn cache_tag(&self, prefix: &str) -> String {
        format!(
            "{}{}:{}",
            prefix,
            self.query_text(),
            self.domain().as_deref().unwrap_or("*")
        )
    }
}

/// Run a datastore call under `limit`, mapping expiry to `Timeout`
pub(crate) async fn with_query_timeout<T, F>(limit: Duration, query: F) -> SearchResult<T>
where
    F: Future<Output = SearchResult<T>>,
{
    tokio::time::timeout(limit, query)
        .await
        .map_err(|_| SearchError::Timeout)?
}
