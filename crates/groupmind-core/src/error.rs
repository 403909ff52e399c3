use thiserror::Error;

/// Error taxonomy shared across all components. Variants are kinds, not
/// per-component names — every leaf crate maps its own failures into one of
/// these before it crosses a component boundary.
#[derive(Debug, Error)]
pub enum GroupmindError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("persistent store error during {operation}: {source}")]
    PersistentStore {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("upstream timed out after {ms}ms")]
    UpstreamTimeout { ms: u64 },

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("circuit breaker open, retry after {retry_after_ms}ms")]
    CircuitBreakerOpen { retry_after_ms: u64 },

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for GroupmindError {
    fn from(e: rusqlite::Error) -> Self {
        GroupmindError::PersistentStore {
            operation: "query".to_string(),
            source: e,
        }
    }
}

impl GroupmindError {
    /// Short error code, analogous to an HTTP-style status tag for logging
    /// and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            GroupmindError::Config(_) => "CONFIG_ERROR",
            GroupmindError::Validation(_) => "VALIDATION_ERROR",
            GroupmindError::NotFound(_) => "NOT_FOUND",
            GroupmindError::PersistentStore { .. } => "PERSISTENT_STORE_ERROR",
            GroupmindError::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            GroupmindError::UpstreamFailure(_) => "UPSTREAM_FAILURE",
            GroupmindError::CircuitBreakerOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            GroupmindError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            GroupmindError::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
            GroupmindError::Serialization(_) => "SERIALIZATION_ERROR",
            GroupmindError::Io(_) => "IO_ERROR",
            GroupmindError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, GroupmindError>;
