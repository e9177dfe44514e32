//! Client for an upstream telemetry feed.
//!
//! Connects to an external agent process streaming JSON-encoded packets over
//! WebSocket and forwards them into a bounded queue. The initial connection
//! attempt is the availability probe: if it fails the caller falls back to
//! the synthetic source. After that the background task reconnects on its
//! own with exponential backoff.

pub mod error;
pub mod feed;

pub use error::{RelayError, Result};
pub use feed::{RelayConfig, RelayFeed};
