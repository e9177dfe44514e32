//! Synthetic sensor data generator.
//!
//! Produces packets that are a deterministic function of the tick index:
//! a sinusoidal lidar ring, an IMU sample oscillating around gravity, and a
//! battery level decaying 0.0001 per tick until it clamps at zero.

use crate::schema::{ImuReading, TelemetryPacket};
use chrono::Utc;
use std::f64::consts::PI;

/// Default number of lidar beams per scan.
pub const DEFAULT_LIDAR_POINTS: usize = 1024;

/// Battery drain per tick, in percentage points.
const BATTERY_DRAIN_PER_TICK: f64 = 0.0001;

fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Generates synthetic telemetry mimicking an autonomous vehicle.
pub struct SensorSimulator {
    vehicle_id: String,
    lidar_points: usize,
    tick: u64,
    battery: f64,
}

impl SensorSimulator {
    /// Create a simulator for the given vehicle with the default lidar size.
    pub fn new(vehicle_id: impl Into<String>) -> Self {
        Self::with_lidar_points(vehicle_id, DEFAULT_LIDAR_POINTS)
    }

    /// Create a simulator with a custom lidar beam count.
    pub fn with_lidar_points(vehicle_id: impl Into<String>, lidar_points: usize) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            lidar_points,
            tick: 0,
            battery: 100.0,
        }
    }

    /// Number of packets generated so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Generate the next packet. The returned `tick` field is 1-based.
    pub fn next_packet(&mut self) -> TelemetryPacket {
        let t = self.tick as f64 * 0.02;
        let phase = self.tick as f64 * 0.05;
        let beams = self.lidar_points as f64;

        let lidar_scan = (0..self.lidar_points)
            .map(|i| round3(10.0 + (phase + (i as f64 / beams) * 8.0 * PI).sin() * 2.0))
            .collect();

        let imu_reading = ImuReading {
            accel_x: round4(t.sin() * 0.5),
            accel_y: round4((t * 0.7).cos() * 0.3),
            accel_z: round4(9.81 + (t * 2.0).sin() * 0.1),
        };

        self.battery = (self.battery - BATTERY_DRAIN_PER_TICK).max(0.0);
        self.tick += 1;

        TelemetryPacket {
            vehicle_id: self.vehicle_id.clone(),
            timestamp: Utc::now().timestamp_micros(),
            lidar_scan,
            imu_reading,
            battery_level: round4(self.battery),
            tick: self.tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_one_based_and_strictly_increasing() {
        let mut sim = SensorSimulator::with_lidar_points("AV-001", 8);
        for expected in 1..=500u64 {
            let packet = sim.next_packet();
            assert_eq!(packet.tick, expected);
        }
    }

    #[test]
    fn battery_is_non_increasing_and_clamps_at_zero() {
        let mut sim = SensorSimulator::with_lidar_points("AV-001", 1);
        let mut previous = 100.0;
        // 100.0 / 0.0001 = 1_000_000 ticks to fully drain.
        for _ in 0..1_000_100 {
            let packet = sim.next_packet();
            assert!(packet.battery_level <= previous);
            assert!(packet.battery_level >= 0.0);
            previous = packet.battery_level;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn signal_values_are_deterministic_per_tick() {
        let mut a = SensorSimulator::with_lidar_points("AV-001", 16);
        let mut b = SensorSimulator::with_lidar_points("AV-001", 16);
        for _ in 0..100 {
            let pa = a.next_packet();
            let pb = b.next_packet();
            assert_eq!(pa.lidar_scan, pb.lidar_scan);
            assert_eq!(pa.imu_reading, pb.imu_reading);
            assert_eq!(pa.battery_level, pb.battery_level);
            assert_eq!(pa.tick, pb.tick);
        }
    }

    #[test]
    fn values_are_finite_at_large_tick_indices() {
        let mut sim = SensorSimulator::with_lidar_points("AV-001", 32);
        sim.tick = (i32::MAX as u64) - 1;
        for _ in 0..3 {
            let packet = sim.next_packet();
            assert!(packet.lidar_scan.iter().all(|d| d.is_finite()));
            assert!(packet.imu_reading.accel_x.is_finite());
            assert!(packet.imu_reading.accel_y.is_finite());
            assert!(packet.imu_reading.accel_z.is_finite());
            assert!(packet.battery_level.is_finite());
        }
    }

    #[test]
    fn lidar_scan_has_configured_length_and_plausible_range() {
        let mut sim = SensorSimulator::with_lidar_points("AV-001", 64);
        let packet = sim.next_packet();
        assert_eq!(packet.lidar_scan.len(), 64);
        // 10.0 ± 2.0 meter ring.
        assert!(packet.lidar_scan.iter().all(|d| (8.0..=12.0).contains(d)));
    }
}
