//! Product datastore
//!
//! [`ProductStore`] is the seam between the search services and storage. The Postgres
//! implementation runs full-text and pgvector queries; the in-memory one mirrors their ordering
//! and filtering for tests and local runs.

mod memory;
mod postgres_client;
mod schema;

use crate::error::SearchResult;
use crate::types::ProductSummary;
use async_trait::async_trait;

pub use memory::MemoryProductStore;
pub use postgres_client::PostgresProductStore;
pub use schema::ProductSchema;

/// Full-text lookup, newest rows first
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalQuery {
    /// Trimmed, non-empty query text
    pub text: String,
    pub domain: Option<String>,
    /// Only rows with a primary key below this value
    pub before_id: Option<i64>,
    /// Rows to fetch; callers ask for one more than the page size
    pub fetch_limit: usize,
}

/// Vector lookup, most similar rows first
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticQuery {
    pub embedding: Vec<f32>,
    pub domain: Option<String>,
    /// Minimum cosine similarity, inclusive
    pub similarity_threshold: f32,
    /// Only rows strictly less similar than this value
    pub below_similarity: Option<f32>,
    pub fetch_limit: usize,
}

/// A product row as projected by every query
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    /// Primary key; increases with insertion order
    pub id: i64,
    pub product_id: i64,
    pub domain: String,
    pub title: String,
    pub price: Option<String>,
    pub image_url: Option<String>,
}

impl From<ProductRow> for ProductSummary {
    fn from(row: ProductRow) -> Self {
        ProductSummary {
            product_id: row.product_id,
            domain: row.domain,
            title: row.title,
            price: row.price,
            image_url: row.image_url,
        }
    }
}

/// Rows returned by a full-text lookup plus the number of rows matching overall
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalMatches {
    pub rows: Vec<ProductRow>,
    pub total: u64,
}

/// A row with its cosine similarity to the query embedding
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProduct {
    pub row: ProductRow,
    pub similarity: f32,
}

/// Storage backend for product search
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Rows matching `query.text`, ordered by descending id
    async fn search_text(&self, query: &LexicalQuery) -> SearchResult<LexicalMatches>;

    /// Rows at or above the similarity threshold, ordered by descending similarity then id
    async fn search_similar(&self, query: &SemanticQuery) -> SearchResult<Vec<ScoredProduct>>;

    /// Check that the store is reachable
    async fn health_check(&self) -> SearchResult<()>;
}
