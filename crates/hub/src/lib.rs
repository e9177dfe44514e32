//! Telemetry fan-out service.
//!
//! This service:
//! - Produces one telemetry packet per tick (synthetic or relayed)
//! - Accepts WebSocket connections from dashboard clients
//! - Broadcasts each packet, serialized once, to every connected subscriber
//! - Serves the browser dashboard bundle on a separate port
//!
//! ## Architecture
//!
//! ```text
//! PacketSource (simulate | relay queue)
//!         ↓  one packet per tick
//! BroadcastLoop (fixed-rate, no catch-up)
//!         ↓  pre-serialized envelope
//! SubscriberRegistry (DashMap)
//!         ↓  bounded per-subscriber channels
//! WebSocket subscribers
//! ```
//!
//! The registry is the only shared mutable state; the tick loop never holds
//! a lock or blocks on a socket while fanning out.

pub mod broadcast;
pub mod client;
pub mod error;
pub mod protocol;
pub mod source;
pub mod static_assets;
pub mod ws_server;

pub use broadcast::BroadcastLoop;
pub use client::{Subscriber, SubscriberId, SubscriberRegistry};
pub use error::{HubError, Result};
pub use protocol::ServerMessage;
pub use source::{PacketSource, SourceMode};
pub use ws_server::{create_router, AppState};
