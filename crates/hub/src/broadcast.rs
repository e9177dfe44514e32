//! Fixed-rate broadcast loop: packet source → every subscriber.
//!
//! One packet per tick, encoded once, fanned out with non-blocking sends.
//! Overrun ticks proceed immediately without catch-up, so overload degrades
//! to a lower effective rate instead of bursty delivery.

use crate::client::SubscriberRegistry;
use crate::error::{HubError, Result};
use crate::protocol::{self, ServerMessage};
use crate::source::PacketSource;
use axum::extract::ws::Message;
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Ticks between progress log lines (one second at 60 Hz).
const PROGRESS_LOG_EVERY: u64 = 60;

/// Drives packet generation and fan-out at a fixed tick rate.
pub struct BroadcastLoop {
    source: PacketSource,
    registry: Arc<SubscriberRegistry>,
    tick_period: Duration,
    ticks: u64,
}

impl BroadcastLoop {
    /// Create a new broadcast loop.
    pub fn new(
        source: PacketSource,
        registry: Arc<SubscriberRegistry>,
        tick_period: Duration,
    ) -> Self {
        Self {
            source,
            registry,
            tick_period,
            ticks: 0,
        }
    }

    /// Run until a shutdown signal arrives (blocking).
    ///
    /// The signal is checked between ticks: the in-flight tick finishes and
    /// no further tick begins. Sending it twice is harmless.
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!(
            "Starting broadcast loop, mode {}, tick period {:?}",
            self.source.mode(),
            self.tick_period
        );

        loop {
            let started = Instant::now();

            self.tick().await?;

            // No catch-up: an overrun tick proceeds straight to the next one.
            let remaining = self.tick_period.saturating_sub(started.elapsed());
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Broadcast loop received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(remaining) => {}
            }
        }

        info!("Broadcast loop stopped at tick {}", self.ticks);
        Ok(())
    }

    /// One tick: pull, encode once, fan out, evict failed subscribers.
    async fn tick(&mut self) -> Result<()> {
        self.ticks += 1;

        let packet = match self.source.next().await {
            Ok(packet) => packet,
            Err(HubError::SourceEmpty) => {
                counter!("hub_ticks_empty_total").increment(1);
                debug!("No packet available for tick {}", self.ticks);
                return Ok(());
            }
            Err(e) => {
                counter!("hub_source_errors_total").increment(1);
                warn!("Packet source error on tick {}: {}", self.ticks, e);
                return Ok(());
            }
        };

        // The packet is generated even with nobody watching, so the source's
        // sequence and decay state advance consistently.
        let subscribers = self.registry.snapshot();
        if subscribers.is_empty() {
            return Ok(());
        }

        // Serialize exactly once per tick. A failure here is a programming
        // error in the schema, not a per-tick condition.
        let json = protocol::encode(&ServerMessage::Telemetry { data: packet })?;

        let mut evicted = Vec::new();
        for subscriber in &subscribers {
            if !subscriber.try_send_raw(Message::Text(json.clone().into())) {
                counter!("hub_sends_failed_total").increment(1);
                evicted.push(subscriber.id);
            }
        }

        for id in evicted {
            warn!("Evicting stalled subscriber {}", id);
            counter!("hub_subscribers_evicted_total").increment(1);
            self.registry.unregister(&id);
        }

        counter!("hub_packets_broadcast_total").increment(1);

        if self.ticks % PROGRESS_LOG_EVERY == 0 {
            debug!(
                "Tick {} | Subscribers: {}",
                self.ticks,
                self.registry.subscriber_count()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Subscriber;
    use crate::source::{PacketSource, SourceMode};
    use telemetry::SensorSimulator;

    const TICK_PERIOD: Duration = Duration::from_micros(16_667);

    fn synthetic_loop(registry: Arc<SubscriberRegistry>) -> BroadcastLoop {
        let source =
            PacketSource::Simulate(SensorSimulator::with_lidar_points("AV-001", 8));
        BroadcastLoop::new(source, registry, TICK_PERIOD)
    }

    fn register_with_buffer(
        registry: &SubscriberRegistry,
        capacity: usize,
    ) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(capacity);
        registry.register(Arc::new(Subscriber::new(tx)));
        rx
    }

    fn decode(msg: Message) -> ServerMessage {
        match msg {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_connected_then_ticks_one_to_one_hundred() {
        let registry = Arc::new(SubscriberRegistry::new());

        // Mirror the acceptor: the handshake envelope is queued first.
        let (tx, mut rx) = mpsc::channel(256);
        let subscriber = Arc::new(Subscriber::new(tx));
        let connected = protocol::encode(&ServerMessage::Connected {
            mode: SourceMode::Simulate,
        })
        .unwrap();
        assert!(subscriber.try_send_raw(Message::Text(connected.into())));
        registry.register(subscriber);

        let mut broadcast = synthetic_loop(registry.clone());
        for _ in 0..100 {
            broadcast.tick().await.unwrap();
        }

        match decode(rx.try_recv().unwrap()) {
            ServerMessage::Connected { mode } => assert_eq!(mode, SourceMode::Simulate),
            other => panic!("expected connected first, got {:?}", other),
        }

        for expected in 1..=100u64 {
            match decode(rx.try_recv().unwrap()) {
                ServerMessage::Telemetry { data } => assert_eq!(data.tick, expected),
                other => panic!("expected telemetry, got {:?}", other),
            }
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stalled_subscriber_is_evicted_without_impacting_others() {
        let registry = Arc::new(SubscriberRegistry::new());
        let _stalled_rx = register_with_buffer(&registry, 1);
        let mut responsive_rx = register_with_buffer(&registry, 64);

        let mut broadcast = synthetic_loop(registry.clone());
        for _ in 0..5 {
            broadcast.tick().await.unwrap();
        }

        // The stalled subscriber filled its one-slot buffer on the first
        // tick and was evicted on the second.
        assert_eq!(registry.subscriber_count(), 1);

        for expected in 1..=5u64 {
            match decode(responsive_rx.try_recv().unwrap()) {
                ServerMessage::Telemetry { data } => assert_eq!(data.tick, expected),
                other => panic!("expected telemetry, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn ticking_advances_the_source_while_nobody_watches() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut broadcast = synthetic_loop(registry.clone());

        broadcast.tick().await.unwrap();
        broadcast.tick().await.unwrap();

        let mut rx = register_with_buffer(&registry, 16);
        broadcast.tick().await.unwrap();

        match decode(rx.try_recv().unwrap()) {
            ServerMessage::Telemetry { data } => assert_eq!(data.tick, 3),
            other => panic!("expected telemetry, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let registry = Arc::new(SubscriberRegistry::new());
        let source =
            PacketSource::Simulate(SensorSimulator::with_lidar_points("AV-001", 8));
        let broadcast = BroadcastLoop::new(source, registry, Duration::from_millis(1));

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(broadcast.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(()).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop after shutdown signal")
            .unwrap();
        assert!(result.is_ok());
    }
}
