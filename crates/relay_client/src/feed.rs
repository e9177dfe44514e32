//! Upstream feed connection and queue management.

use crate::error::{RelayError, Result};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use std::time::Duration;
use telemetry::TelemetryPacket;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for the upstream feed connection.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream agent address (host:port, or a full ws:// URL).
    pub addr: String,
    /// Timeout for each connection attempt.
    pub connect_timeout: Duration,
    /// Initial delay before a reconnection attempt.
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay (for exponential backoff).
    pub max_reconnect_delay: Duration,
    /// Capacity of the packet queue between the feed task and the consumer.
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:50051".to_string(),
            connect_timeout: Duration::from_secs(3),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            queue_capacity: 256,
        }
    }
}

impl RelayConfig {
    /// Config for a specific upstream address, defaults otherwise.
    pub fn for_addr(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// The WebSocket URL derived from `addr`.
    pub fn url(&self) -> String {
        feed_url(&self.addr)
    }
}

/// Build the feed URL from a bare address. A full URL passes through.
fn feed_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("ws://{}/feed", addr)
    }
}

/// Parse one text frame from the upstream into a packet.
fn parse_packet(text: &str) -> Result<TelemetryPacket> {
    Ok(serde_json::from_str(text)?)
}

/// Handle to a running upstream feed.
///
/// Owns the receiving end of the packet queue; dropping it shuts the
/// background task down at its next send or reconnect attempt.
pub struct RelayFeed {
    rx: mpsc::Receiver<TelemetryPacket>,
}

impl RelayFeed {
    /// Probe the upstream and start the background feed task.
    ///
    /// The first connection attempt happens inline so an unreachable
    /// upstream is reported to the caller instead of being retried forever.
    pub async fn connect(config: RelayConfig) -> Result<Self> {
        let url = config.url();
        info!("Connecting to upstream feed: {}", url);

        let stream = match tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()))
            .await
        {
            Ok(Ok((stream, response))) => {
                debug!("Feed handshake complete, status: {:?}", response.status());
                stream
            }
            Ok(Err(e)) => return Err(RelayError::WebSocket(e)),
            Err(_) => {
                return Err(RelayError::Unavailable(format!(
                    "connect to {} timed out after {:?}",
                    url, config.connect_timeout
                )))
            }
        };

        info!("Upstream feed connected");

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        tokio::spawn(run_feed(stream, tx, config));

        Ok(Self { rx })
    }

    /// Receive the next packet. `None` means the feed task has exited.
    pub async fn recv(&mut self) -> Option<TelemetryPacket> {
        self.rx.recv().await
    }

    /// Take the raw queue receiver, for callers that poll it inside their
    /// own select loop.
    pub fn into_receiver(self) -> mpsc::Receiver<TelemetryPacket> {
        self.rx
    }
}

/// Why a read loop ended.
enum ReadOutcome {
    /// The consumer side of the queue was dropped; stop for good.
    ConsumerGone,
    /// The upstream connection dropped; reconnect.
    Disconnected,
}

/// Drive the feed: read until disconnect, then reconnect with backoff.
async fn run_feed(
    mut stream: FeedStream,
    tx: mpsc::Sender<TelemetryPacket>,
    config: RelayConfig,
) {
    let url = config.url();
    let mut delay = config.reconnect_delay;

    loop {
        match read_loop(stream, &tx).await {
            ReadOutcome::ConsumerGone => {
                info!("Feed consumer dropped, stopping upstream task");
                return;
            }
            ReadOutcome::Disconnected => {
                counter!("relay_disconnects_total").increment(1);
            }
        }

        // Reconnect with exponential backoff.
        stream = loop {
            if tx.is_closed() {
                info!("Feed consumer dropped, stopping upstream task");
                return;
            }

            warn!("Upstream feed disconnected, reconnecting in {:?}", delay);
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(config.max_reconnect_delay);

            match tokio::time::timeout(config.connect_timeout, connect_async(url.as_str())).await {
                Ok(Ok((stream, _))) => {
                    info!("Upstream feed reconnected");
                    delay = config.reconnect_delay;
                    break stream;
                }
                Ok(Err(e)) => debug!("Reconnect to {} failed: {}", url, e),
                Err(_) => debug!("Reconnect to {} timed out", url),
            }
        };
    }
}

/// Read frames from one connection until it drops or the consumer goes away.
async fn read_loop(stream: FeedStream, tx: &mpsc::Sender<TelemetryPacket>) -> ReadOutcome {
    let (mut write, mut read) = stream.split();

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match parse_packet(text.as_str()) {
                Ok(packet) => {
                    counter!("relay_packets_received_total").increment(1);
                    match tx.try_send(packet) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            counter!("relay_packets_dropped_total").increment(1);
                            debug!("Feed queue full, dropping packet");
                        }
                        Err(TrySendError::Closed(_)) => return ReadOutcome::ConsumerGone,
                    }
                }
                Err(e) => {
                    counter!("relay_parse_errors_total").increment(1);
                    warn!("Unparseable feed frame: {}", e);
                }
            },
            Ok(Message::Ping(data)) => {
                if write.send(Message::Pong(data)).await.is_err() {
                    return ReadOutcome::Disconnected;
                }
            }
            Ok(Message::Close(frame)) => {
                info!("Upstream sent close frame: {:?}", frame);
                return ReadOutcome::Disconnected;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Upstream read error: {}", e);
                return ReadOutcome::Disconnected;
            }
        }
    }

    ReadOutcome::Disconnected
}
