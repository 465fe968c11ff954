//! Engine error types

use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the mocking engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// No interceptor accepted the request and the network gate refused it
    #[error("No match for request {method} {url}")]
    NoMatch { method: String, url: String },

    /// The body source failed while the consumer was reading
    #[error("Body source error: {0}")]
    BodySource(String),

    /// A declared matcher could not be built
    #[error("Matcher configuration error: {0}")]
    MatcherConfiguration(String),

    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// Pass-through to the real network failed
    #[error("Network error: {0}")]
    Network(String),

    /// Interceptors that were declared but never satisfied
    #[error("Mocks not yet satisfied: {}", .0.join(", "))]
    PendingMocks(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether this error means the request was rejected for lack of a mock
    pub fn is_no_match(&self) -> bool {
        matches!(self, EngineError::NoMatch { .. })
    }
}
