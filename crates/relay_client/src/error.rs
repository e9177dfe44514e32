//! Relay client error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("upstream feed unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
