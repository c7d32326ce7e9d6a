use thiserror::Error;

/// Main error type for the search pipeline, shared by the client and the backend services
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// Invalid request parameters (empty or too-short query, malformed cursor)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A deadline elapsed (per-attempt, datastore query or handler timeout)
    #[error("Request timeout")]
    Timeout,

    /// The request was superseded or cancelled by its caller
    #[error("Request aborted")]
    Aborted,

    /// Missing or rejected bearer credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The search backend answered with a non-success status
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Connection-level failure talking to the search backend
    #[error("Network error: {0}")]
    Network(String),

    /// Circuit is open and no cached page was available
    #[error("Search temporarily degraded: {0}")]
    Degraded(String),

    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(String),

    /// Embedding provider error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Check if the error is a cancellation, which is never reported to users
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SearchError::Aborted)
    }

    /// Whether a failed attempt with this error may be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            // Transient transport failures
            SearchError::Timeout => true,
            SearchError::Network(_) => true,
            SearchError::Upstream { status, .. } => *status >= 500 || *status == 429,

            // Never retried
            SearchError::Aborted => false,
            SearchError::Unauthorized(_) => false,
            SearchError::InvalidRequest(_) => false,
            SearchError::Degraded(_) => false,
            SearchError::Serialization(_) => false,
            SearchError::Config(_) => false,

            // Backend-side errors do not cross the transport
            SearchError::Database(_) => false,
            SearchError::Embedding(_) => false,
            SearchError::Internal(_) => false,
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            SearchError::InvalidRequest(_) => 400,
            SearchError::Unauthorized(_) => 401,
            SearchError::Timeout => 504,
            SearchError::Degraded(_) => 503,
            SearchError::Upstream { status, .. } => *status,
            // nginx-style "client closed request"
            SearchError::Aborted => 499,
            SearchError::Network(_) => 500,
            SearchError::Database(_) => 500,
            SearchError::Embedding(_) => 500,
            SearchError::Config(_) => 500,
            SearchError::Serialization(_) => 500,
            SearchError::Internal(_) => 500,
        }
    }

    /// Get error type as string for logging and metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            SearchError::InvalidRequest(_) => "invalid_request",
            SearchError::Timeout => "timeout",
            SearchError::Aborted => "aborted",
            SearchError::Unauthorized(_) => "unauthorized",
            SearchError::Upstream { .. } => "upstream_error",
            SearchError::Network(_) => "network_error",
            SearchError::Degraded(_) => "circuit_open_degraded",
            SearchError::Database(_) => "database_error",
            SearchError::Embedding(_) => "embedding_error",
            SearchError::Config(_) => "config_error",
            SearchError::Serialization(_) => "serialization_error",
            SearchError::Internal(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Validation error for request parameters
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}

impl From<ValidationError> for SearchError {
    fn from(err: ValidationError) -> Self {
        SearchError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(SearchError::Timeout.is_retryable());
        assert!(SearchError::Network("reset".to_string()).is_retryable());
        assert!(SearchError::Upstream { status: 502, message: "bad gateway".to_string() }.is_retryable());
        assert!(SearchError::Upstream { status: 429, message: "slow down".to_string() }.is_retryable());

        assert!(!SearchError::Upstream { status: 404, message: "missing".to_string() }.is_retryable());
        assert!(!SearchError::Unauthorized("no key".to_string()).is_retryable());
        assert!(!SearchError::Aborted.is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SearchError::Timeout.status_code(), 504);
        assert_eq!(SearchError::Unauthorized("x".to_string()).status_code(), 401);
        assert_eq!(SearchError::InvalidRequest("x".to_string()).status_code(), 400);
        assert_eq!(SearchError::Database("x".to_string()).status_code(), 500);
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: SearchError = ValidationError::InvalidCursor("abc".to_string()).into();
        assert!(matches!(err, SearchError::InvalidRequest(ref msg) if msg.contains("abc")));
        assert!(SearchError::Aborted.is_cancellation());
    }
}
