//! Subscriber state and registry management.
//!
//! Uses DashMap so registration and removal stay concurrent with broadcast
//! iteration. The broadcast loop works from `snapshot()` and only ever calls
//! `try_send`, so a slow or dead subscriber can never stall it.

use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::DashMap;
use metrics::gauge;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Unique subscriber identifier.
pub type SubscriberId = Uuid;

/// Buffer size for per-subscriber send channels.
/// A few seconds of backlog at 60 Hz; a subscriber that falls further behind
/// than this is treated as stalled and evicted.
pub const SUBSCRIBER_CHANNEL_BUFFER: usize = 256;

/// State for a single connected subscriber.
pub struct Subscriber {
    /// Unique subscriber identifier.
    pub id: SubscriberId,
    /// Bounded channel to the subscriber's send task. The bound is the
    /// per-write deadline: the broadcast loop never blocks on a socket.
    pub tx: mpsc::Sender<Message>,
    /// Timestamp when the subscriber connected (milliseconds since epoch).
    pub connected_at: i64,
}

impl Subscriber {
    /// Create a new subscriber wired to the given send channel.
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            connected_at: Utc::now().timestamp_millis(),
        }
    }

    /// Try to send a message without blocking.
    /// Returns false when the channel is full or closed.
    pub fn try_send_raw(&self, msg: Message) -> bool {
        self.tx.try_send(msg).is_ok()
    }
}

/// Registry of connected subscribers.
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<Subscriber>>,
}

impl SubscriberRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Register a subscriber. O(1), safe alongside broadcast iteration.
    pub fn register(&self, subscriber: Arc<Subscriber>) -> SubscriberId {
        let id = subscriber.id;
        self.subscribers.insert(id, subscriber);
        gauge!("hub_active_subscribers").set(self.subscriber_count() as f64);
        info!("Subscriber {} registered", id);
        id
    }

    /// Remove a subscriber. Idempotent: a no-op when the id is absent.
    pub fn unregister(&self, id: &SubscriberId) {
        if self.subscribers.remove(id).is_some() {
            gauge!("hub_active_subscribers").set(self.subscriber_count() as f64);
            info!("Subscriber {} unregistered", id);
        }
    }

    /// Copy of the current subscriber set for broadcast iteration.
    /// The copy is immutable: concurrent register/unregister calls never
    /// mutate it mid-iteration, and they only contend for the duration of
    /// the copy itself.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.iter().map(|e| e.value().clone()).collect()
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
