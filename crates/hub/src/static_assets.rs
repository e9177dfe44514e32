//! Dashboard bundle server.
//!
//! Peripheral to the broadcast core: serves the browser UI files on their
//! own port.

use axum::Router;
use std::path::Path;
use tower_http::services::ServeDir;

/// Router serving static files from the given directory.
pub fn create_router(asset_dir: impl AsRef<Path>) -> Router {
    Router::new().fallback_service(ServeDir::new(asset_dir))
}
