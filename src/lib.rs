pub mod cache;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod ml;
pub mod observability;
pub mod search;
pub mod server;
pub mod types;

pub use cache::{CacheConfig, SearchCache};
pub use client::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, HttpSearchTransport, OrchestratorConfig, RetryConfig,
    RetryExecutor, SearchClient, SearchEvent, SearchListener, SearchOrchestrator, SearchOutcome, SearchTransport,
};
pub use config::{ClientConfig, Config};
pub use database::{MemoryProductStore, PostgresProductStore, ProductStore};
pub use error::{SearchError, SearchResult};
pub use ml::{EmbeddingProvider, HashingEmbedder, HttpEmbeddingProvider};
pub use search::{LexicalSearchService, SemanticSearchService};
pub use server::SearchServer;
pub use types::*;
