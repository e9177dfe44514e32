//! Hub error types.

use thiserror::Error;

/// Hub error type.
#[derive(Debug, Error)]
pub enum HubError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Upstream relay feed error.
    #[error("relay feed error: {0}")]
    Relay(#[from] relay_client::RelayError),

    /// The packet source produced nothing before the poll deadline.
    /// Recoverable: the tick delivers nothing and scheduling continues.
    #[error("no packet available before the poll deadline")]
    SourceEmpty,
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
