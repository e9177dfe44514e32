//! Telemetry packet schema and the synthetic sensor simulator.

pub mod schema;
pub mod simulator;

pub use schema::{ImuReading, TelemetryPacket};
pub use simulator::SensorSimulator;
