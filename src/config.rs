use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::client::{CircuitBreakerConfig, OrchestratorConfig, RetryConfig};
use crate::error::{SearchError, SearchResult};
use crate::types::SearchStrategy;

/// Backend configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,
    /// Search policy shared by both strategies
    pub search: SearchPolicyConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Overall handler timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Origins allowed by the CORS layer
    pub allowed_origins: Vec<String>,
    /// Accepted bearer credentials
    pub api_keys: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub database_url: String,
    /// Maximum database connections
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// Create the products table and indexes on startup
    pub initialize_schema: bool,
}

/// Embedding provider configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of the feature-extraction endpoint
    pub api_url: String,
    /// Model identifier appended to the base URL
    pub model: String,
    /// Bearer token for the provider
    pub api_token: Option<String>,
    /// Expected vector dimension
    pub dimension: usize,
    /// Provider call timeout in milliseconds
    pub timeout_ms: u64,
}

/// Search policy configuration
#[derive(Debug, Clone)]
pub struct SearchPolicyConfig {
    /// Datastore query timeout in milliseconds
    pub query_timeout_ms: u64,
    /// Minimum cosine similarity for semantic matches
    pub similarity_threshold: f32,
    /// Shared cache lifetime advertised to intermediaries
    pub shared_max_age_secs: u64,
    /// stale-while-revalidate window advertised to intermediaries
    pub stale_while_revalidate_secs: u64,
}

impl SearchPolicyConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Value of the Cache-Control header attached to successful searches
    pub fn cache_control_header(&self) -> String {
        format!(
            "public, s-maxage={}, stale-while-revalidate={}",
            self.shared_max_age_secs, self.stale_while_revalidate_secs
        )
    }
}

impl Default for SearchPolicyConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 2500,
            similarity_threshold: 0.6,
            shared_max_age_secs: 60,
            stale_while_revalidate_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> SearchResult<Self> {
        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            tracing::warn!("Could not load .env file: {}", e);
        }

        let config = Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SERVER_PORT", 8080)?,
                request_timeout_ms: env_or("REQUEST_TIMEOUT_MS", 4000)?,
                allowed_origins: parse_list(
                    &env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
                ),
                api_keys: parse_list(
                    &env::var("SEARCH_API_KEYS")
                        .map_err(|_| SearchError::Config("SEARCH_API_KEYS is required".to_string()))?,
                ),
            },
            database: DatabaseConfig {
                database_url: env::var("DATABASE_URL")
                    .map_err(|_| SearchError::Config("DATABASE_URL is required".to_string()))?,
                max_connections: env_or("DB_MAX_CONNECTIONS", 10)?,
                connection_timeout_secs: env_or("DB_CONNECTION_TIMEOUT_SECS", 30)?,
                initialize_schema: env_or("DB_INIT_SCHEMA", false)?,
            },
            embedding: EmbeddingConfig {
                api_url: env::var("EMBEDDING_API_URL").unwrap_or_else(|_| {
                    "https://api-inference.huggingface.co/pipeline/feature-extraction".to_string()
                }),
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string()),
                api_token: env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
                dimension: env_or("EMBEDDING_DIMENSION", 384)?,
                timeout_ms: env_or("EMBEDDING_TIMEOUT_MS", 2000)?,
            },
            search: SearchPolicyConfig {
                query_timeout_ms: env_or("QUERY_TIMEOUT_MS", 2500)?,
                similarity_threshold: env_or("SIMILARITY_THRESHOLD", 0.6)?,
                shared_max_age_secs: env_or("CACHE_S_MAXAGE_SECS", 60)?,
                stale_while_revalidate_secs: env_or("CACHE_STALE_WHILE_REVALIDATE_SECS", 30)?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SearchResult<()> {
        if self.server.port == 0 {
            return Err(SearchError::Config("Server port cannot be 0".to_string()));
        }

        if self.server.request_timeout_ms == 0 {
            return Err(SearchError::Config("Request timeout must be greater than 0".to_string()));
        }

        if self.server.api_keys.is_empty() {
            return Err(SearchError::Config("At least one API key must be configured".to_string()));
        }

        if !self.database.database_url.starts_with("postgres://")
            && !self.database.database_url.starts_with("postgresql://")
        {
            return Err(SearchError::Config(
                "DATABASE_URL must start with postgres:// or postgresql://".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(SearchError::Config("Embedding dimension must be greater than 0".to_string()));
        }

        if url::Url::parse(&self.embedding.api_url).is_err() {
            return Err(SearchError::Config("EMBEDDING_API_URL must be a valid URL".to_string()));
        }

        if self.search.query_timeout_ms == 0 {
            return Err(SearchError::Config("Query timeout must be greater than 0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.search.similarity_threshold) {
            return Err(SearchError::Config(
                "Similarity threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                request_timeout_ms: 4000,
                allowed_origins: vec!["http://localhost:3000".to_string()],
                api_keys: Vec::new(),
            },
            database: DatabaseConfig {
                database_url: "".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
                initialize_schema: false,
            },
            embedding: EmbeddingConfig {
                api_url: "https://api-inference.huggingface.co/pipeline/feature-extraction".to_string(),
                model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
                api_token: None,
                dimension: 384,
                timeout_ms: 2000,
            },
            search: SearchPolicyConfig::default(),
        }
    }
}

/// Client pipeline configuration (orchestrator, retry, breaker, cache, endpoint)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the search backend
    pub endpoint: String,
    /// Bearer credential sent with every request
    pub api_key: Option<String>,
    /// Backend strategy queries are routed to
    pub strategy: SearchStrategy,
    pub orchestrator: OrchestratorConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
}

impl ClientConfig {
    /// Load client configuration from environment variables
    pub fn from_env() -> SearchResult<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::warn!("Could not load .env file: {}", e);
        }

        let retry_defaults = RetryConfig::default();
        let breaker_defaults = CircuitBreakerConfig::default();

        let config = ClientConfig {
            endpoint: env::var("SEARCH_API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            api_key: env::var("SEARCH_API_KEY").ok().filter(|k| !k.is_empty()),
            strategy: env::var("SEARCH_STRATEGY")
                .ok()
                .map(|s| s.parse::<SearchStrategy>())
                .transpose()
                .map_err(|e| SearchError::Config(format!("Invalid SEARCH_STRATEGY: {}", e)))?
                .unwrap_or_default(),
            orchestrator: OrchestratorConfig {
                debounce: Duration::from_millis(env_or("SEARCH_DEBOUNCE_MS", 500)?),
                min_query_length: env_or("SEARCH_MIN_QUERY_LENGTH", 2)?,
            },
            retry: RetryConfig {
                max_retries: env_or("SEARCH_MAX_RETRIES", retry_defaults.max_retries)?,
                initial_delay: Duration::from_millis(env_or("SEARCH_RETRY_INITIAL_DELAY_MS", 1000)?),
                attempt_timeout: Duration::from_millis(env_or("SEARCH_REQUEST_TIMEOUT_MS", 10_000)?),
                ..retry_defaults
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env_or("CIRCUIT_FAILURE_THRESHOLD", breaker_defaults.failure_threshold)?,
                reset_timeout: Duration::from_millis(env_or("CIRCUIT_RESET_TIMEOUT_MS", 30_000)?),
                half_open_max_calls: env_or("CIRCUIT_HALF_OPEN_MAX_CALLS", breaker_defaults.half_open_max_calls)?,
            },
            cache: CacheConfig {
                ttl: Duration::from_secs(env_or("SEARCH_CACHE_TTL_SECS", 300)?),
                max_size: env_or("SEARCH_CACHE_MAX_SIZE", 100)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the client configuration
    pub fn validate(&self) -> SearchResult<()> {
        if url::Url::parse(&self.endpoint).is_err() {
            return Err(SearchError::Config("SEARCH_API_URL must be a valid URL".to_string()));
        }

        if self.retry.attempt_timeout.is_zero() {
            return Err(SearchError::Config("Request timeout must be greater than 0".to_string()));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(SearchError::Config("Failure threshold must be greater than 0".to_string()));
        }

        if self.cache.max_size == 0 {
            return Err(SearchError::Config("Cache size must be greater than 0".to_string()));
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            api_key: None,
            strategy: SearchStrategy::default(),
            orchestrator: OrchestratorConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Read and parse an environment variable, falling back to `default` when unset
fn env_or<T>(name: &str, default: T) -> SearchResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SearchError::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated list, dropping empty entries
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
