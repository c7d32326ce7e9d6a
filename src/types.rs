use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on page size, shared by both backend strategies
pub const MAX_RESULTS: usize = 24;

/// Page size used by the backend when the caller does not send a usable limit
pub const DEFAULT_BACKEND_LIMIT: usize = 20;

/// Result ordering reported by a search page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Text-search relevance (lexical default)
    #[default]
    Rank,
    /// Most recent first
    Recent,
    /// Descending cosine similarity (semantic only)
    Similarity,
}

impl SortMode {
    /// Parse a `sort` query parameter; anything other than `recent` means rank
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "recent" => SortMode::Recent,
            _ => SortMode::Rank,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Rank => "rank",
            SortMode::Recent => "recent",
            SortMode::Similarity => "similarity",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend endpoint a client query is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// Full-text search over the product title vector
    Lexical,
    /// Embedding + vector similarity search
    #[default]
    Semantic,
}

impl SearchStrategy {
    /// Path of the backend endpoint serving this strategy
    pub fn path(&self) -> &'static str {
        match self {
            SearchStrategy::Lexical => "search/lexical",
            SearchStrategy::Semantic => "search/semantic",
        }
    }
}

impl std::str::FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lexical" | "text" => Ok(SearchStrategy::Lexical),
            "semantic" | "vector" => Ok(SearchStrategy::Semantic),
            other => Err(format!("unknown search strategy '{}'", other)),
        }
    }
}

/// A single search request as issued by the client pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Trimmed query text
    pub text: String,
    /// Optional shop domain filter
    pub domain: Option<String>,
    /// Requested ordering
    pub sort: SortMode,
    /// Page size, always within `[1, MAX_RESULTS]`
    pub limit: usize,
    /// Opaque continuation token from a previous page
    pub cursor: Option<String>,
}

impl SearchQuery {
    /// Create a first-page query with the default client page size
    pub fn new(text: impl AsRef<str>) -> Self {
        Self {
            text: text.as_ref().trim().to_string(),
            domain: None,
            sort: SortMode::Rank,
            limit: MAX_RESULTS,
            cursor: None,
        }
    }

    pub fn with_domain(mut self, domain: impl AsRef<str>) -> Self {
        let domain = domain.as_ref().trim();
        self.domain = if domain.is_empty() { None } else { Some(domain.to_string()) };
        self
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = clamp_limit(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Whether this query asks for the first page
    pub fn is_first_page(&self) -> bool {
        self.cursor.is_none()
    }

    /// Key under which this query's first page is cached
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.text, self.domain.as_deref())
    }

    /// Page size and ordering a cached page must have been fetched with to answer this query
    pub fn page_shape(&self) -> PageShape {
        PageShape {
            limit: self.limit,
            sort: self.sort,
        }
    }
}

/// Request parameters that change the contents of a first page without changing its cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageShape {
    pub limit: usize,
    pub sort: SortMode,
}

impl Default for PageShape {
    fn default() -> Self {
        Self {
            limit: MAX_RESULTS,
            sort: SortMode::Rank,
        }
    }
}

/// Clamp a page size into `[1, MAX_RESULTS]`
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_RESULTS)
}

/// Cache key: normalized query text plus domain (or the `*` wildcard)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query: String,
    pub domain: String,
}

impl CacheKey {
    pub fn new(query: &str, domain: Option<&str>) -> Self {
        Self {
            query: query.trim().to_string(),
            domain: domain
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or("*")
                .to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.query, self.domain)
    }
}

/// Minimal product projection returned by both search strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    /// Shop-assigned product identifier
    pub product_id: i64,
    /// Shop domain the product belongs to
    pub domain: String,
    pub title: String,
    /// Price of the first variant, as published by the shop
    pub price: Option<String>,
    /// Source URL of the first image
    pub image_url: Option<String>,
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultPage {
    pub items: Vec<ProductSummary>,
    pub total: u64,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub sort: SortMode,
}

impl SearchResultPage {
    /// An empty page reporting the given ordering
    pub fn empty(sort: SortMode) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            has_more: false,
            next_cursor: None,
            sort,
        }
    }

    /// Build a page from `limit + 1` fetched rows.
    ///
    /// If more than `limit` rows were fetched the surplus is dropped and `cursor_of`
    /// derives the continuation token from the last kept row.
    pub fn from_overfetch<R, C, M>(
        mut rows: Vec<R>,
        limit: usize,
        total: u64,
        sort: SortMode,
        cursor_of: C,
        into_item: M,
    ) -> Self
    where
        C: Fn(&R) -> String,
        M: Fn(R) -> ProductSummary,
    {
        let mut next_cursor = None;
        if rows.len() > limit {
            rows.truncate(limit);
            next_cursor = rows.last().map(&cursor_of);
        }

        Self {
            items: rows.into_iter().map(into_item).collect(),
            total,
            has_more: next_cursor.is_some(),
            next_cursor,
            sort,
        }
    }
}
