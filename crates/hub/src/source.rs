//! Packet sources for the broadcast loop.
//!
//! Two interchangeable variants behind one `next()` contract: a
//! deterministic synthetic simulator, and a relay pulling from the upstream
//! feed queue. Mode resolution happens once at startup; an unreachable
//! upstream falls back to the simulator and the substitution is logged.

use crate::error::{HubError, Result};
use clap::ValueEnum;
use relay_client::{RelayConfig, RelayFeed};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use telemetry::{SensorSimulator, TelemetryPacket};
use tokio::sync::mpsc;

/// Which packet source is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Deterministic synthetic generator.
    Simulate,
    /// Forward packets from the upstream agent feed.
    Relay,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Simulate => write!(f, "simulate"),
            SourceMode::Relay => write!(f, "relay"),
        }
    }
}

/// Produces one telemetry packet per tick.
pub enum PacketSource {
    /// Synthetic generator owned by the loop task. No locking needed.
    Simulate(SensorSimulator),
    /// Consumer side of the upstream feed queue.
    Relay {
        rx: mpsc::Receiver<TelemetryPacket>,
        /// Local sequence counter; upstream numbering is discarded.
        ticks: u64,
        /// High-water timestamp for monotonicity clamping.
        last_timestamp: i64,
        /// How long `next()` may wait on the queue within one tick.
        poll_deadline: Duration,
    },
}

impl PacketSource {
    /// Synthetic source for the given vehicle.
    pub fn simulate(vehicle_id: &str) -> Self {
        Self::Simulate(SensorSimulator::new(vehicle_id))
    }

    /// Resolve the source for the requested mode.
    ///
    /// In relay mode this probes the upstream once; if it is unreachable the
    /// synthetic source is substituted for the lifetime of the process.
    pub async fn for_mode(
        mode: SourceMode,
        relay_addr: &str,
        vehicle_id: &str,
        tick_period: Duration,
    ) -> Self {
        match mode {
            SourceMode::Simulate => Self::simulate(vehicle_id),
            SourceMode::Relay => {
                match RelayFeed::connect(RelayConfig::for_addr(relay_addr)).await {
                    Ok(feed) => Self::relay(feed.into_receiver(), tick_period),
                    Err(e) => {
                        tracing::warn!(
                            "Upstream feed unavailable ({}), falling back to simulation",
                            e
                        );
                        Self::simulate(vehicle_id)
                    }
                }
            }
        }
    }

    /// Relay source over an already-established feed queue.
    pub fn relay(rx: mpsc::Receiver<TelemetryPacket>, tick_period: Duration) -> Self {
        Self::Relay {
            rx,
            ticks: 0,
            last_timestamp: 0,
            // Leave headroom in the tick for encoding and fan-out.
            poll_deadline: tick_period / 2,
        }
    }

    /// The active mode, as announced to subscribers.
    pub fn mode(&self) -> SourceMode {
        match self {
            Self::Simulate(_) => SourceMode::Simulate,
            Self::Relay { .. } => SourceMode::Relay,
        }
    }

    /// Produce the packet for this tick.
    ///
    /// The synthetic variant never fails. The relay variant waits on its
    /// queue up to the poll deadline and renumbers what it receives, so the
    /// per-source sequence and timestamp invariants hold locally no matter
    /// what the upstream sends.
    pub async fn next(&mut self) -> Result<TelemetryPacket> {
        match self {
            Self::Simulate(simulator) => Ok(simulator.next_packet()),
            Self::Relay {
                rx,
                ticks,
                last_timestamp,
                poll_deadline,
            } => match tokio::time::timeout(*poll_deadline, rx.recv()).await {
                Ok(Some(mut packet)) => {
                    *ticks += 1;
                    packet.tick = *ticks;
                    packet.timestamp = packet.timestamp.max(*last_timestamp);
                    *last_timestamp = packet.timestamp;
                    Ok(packet)
                }
                Ok(None) => Err(HubError::Relay(relay_client::RelayError::Unavailable(
                    "feed task stopped".to_string(),
                ))),
                Err(_) => Err(HubError::SourceEmpty),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry::ImuReading;

    const TICK_PERIOD: Duration = Duration::from_micros(16_667);

    fn upstream_packet(tick: u64, timestamp: i64) -> TelemetryPacket {
        TelemetryPacket {
            vehicle_id: "AV-007".to_string(),
            timestamp,
            lidar_scan: vec![10.0],
            imu_reading: ImuReading {
                accel_x: 0.0,
                accel_y: 0.0,
                accel_z: 9.81,
            },
            battery_level: 50.0,
            tick,
        }
    }

    #[tokio::test]
    async fn relay_renumbers_locally_and_clamps_timestamps() {
        let (tx, rx) = mpsc::channel(8);
        let mut source = PacketSource::relay(rx, TICK_PERIOD);

        // Upstream sequence numbers are arbitrary and its clock steps back.
        tx.send(upstream_packet(900, 2_000)).await.unwrap();
        tx.send(upstream_packet(17, 1_500)).await.unwrap();
        tx.send(upstream_packet(18, 3_000)).await.unwrap();

        let first = source.next().await.unwrap();
        let second = source.next().await.unwrap();
        let third = source.next().await.unwrap();

        assert_eq!(first.tick, 1);
        assert_eq!(second.tick, 2);
        assert_eq!(third.tick, 3);
        assert_eq!(first.timestamp, 2_000);
        assert_eq!(second.timestamp, 2_000);
        assert_eq!(third.timestamp, 3_000);
    }

    #[tokio::test]
    async fn relay_reports_empty_at_poll_deadline() {
        let (tx, rx) = mpsc::channel::<TelemetryPacket>(8);
        let mut source = PacketSource::relay(rx, Duration::from_millis(10));

        let result = source.next().await;
        assert!(matches!(result, Err(HubError::SourceEmpty)));
        drop(tx);
    }

    #[tokio::test]
    async fn unreachable_upstream_falls_back_to_simulation() {
        let mut source = PacketSource::for_mode(
            SourceMode::Relay,
            "127.0.0.1:1",
            "AV-001",
            TICK_PERIOD,
        )
        .await;

        assert_eq!(source.mode(), SourceMode::Simulate);
        let packet = source.next().await.unwrap();
        assert_eq!(packet.tick, 1);
        assert_eq!(packet.vehicle_id, "AV-001");
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SourceMode::Simulate).unwrap(),
            "\"simulate\""
        );
        assert_eq!(SourceMode::Relay.to_string(), "relay");
    }
}
