//! Telemetry packet schema definitions.

use serde::{Deserialize, Serialize};

/// Inertial measurement unit reading, in m/s².
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImuReading {
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
}

/// One telemetry sample from a vehicle.
///
/// Field values are rounded at generation time (3 decimals for lidar, 4 for
/// IMU and battery), so a packet survives a JSON round-trip bit-exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryPacket {
    /// Source vehicle identifier (e.g., "AV-001").
    pub vehicle_id: String,
    /// Capture time in microseconds since epoch. Non-decreasing per vehicle.
    pub timestamp: i64,
    /// Lidar distance ring, one value per beam, in meters.
    pub lidar_scan: Vec<f64>,
    /// IMU accelerometer sample.
    pub imu_reading: ImuReading,
    /// Remaining battery percentage. Non-increasing, clamped at 0.
    pub battery_level: f64,
    /// Sequence number, 1-based, +1 per generated packet.
    pub tick: u64,
}
