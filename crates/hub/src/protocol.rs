//! WebSocket protocol message types.
//!
//! The protocol is broadcast-only: clients receive tagged JSON envelopes and
//! anything they send is discarded.

use crate::error::Result;
use crate::source::SourceMode;
use serde::{Deserialize, Serialize};
use telemetry::TelemetryPacket;

/// Message sent from server to subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake message, sent once at registration. Announces which packet
    /// source is active.
    Connected {
        /// Active source mode ("simulate" or "relay").
        mode: SourceMode,
    },
    /// Telemetry envelope, sent every tick.
    Telemetry {
        /// The packet for this tick.
        data: TelemetryPacket,
    },
}

/// Encode a message to its wire representation.
///
/// Pure and stable: the same message always encodes to the same bytes.
pub fn encode(msg: &ServerMessage) -> Result<String> {
    Ok(serde_json::to_string(msg)?)
}
