use thiserror::Error;

/// Top-level error type for TierRoute operations.
#[derive(Debug, Error)]
pub enum TierRouteError {
    // --- External collaborator errors ---
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    // --- Operational errors ---
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl TierRouteError {
    /// Whether this error came from an external collaborator the router
    /// degrades around (registry sidecar, embedding provider).
    pub fn is_collaborator(&self) -> bool {
        matches!(self, Self::Registry(_) | Self::Embedding(_))
    }
}

/// Result type alias for TierRoute operations.
pub type Result<T> = std::result::Result<T, TierRouteError>;
