//! WebSocket acceptor using Axum.

use crate::client::{Subscriber, SubscriberRegistry, SUBSCRIBER_CHANNEL_BUFFER};
use crate::protocol::{self, ServerMessage};
use crate::source::SourceMode;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

/// Shared application state.
pub struct AppState {
    pub registry: Arc<SubscriberRegistry>,
    /// Active source mode, announced in the handshake envelope.
    pub mode: SourceMode,
}

/// Create the subscriber-facing router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    format!(
        r#"{{"status":"ok","subscribers":{}}}"#,
        state.registry.subscriber_count()
    )
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle one subscriber connection for its whole lifecycle.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Message>(SUBSCRIBER_CHANNEL_BUFFER);
    let subscriber = Arc::new(Subscriber::new(tx));
    let id = subscriber.id;

    // Queue the handshake before registering, so it always precedes the
    // first broadcast frame.
    let connected = match protocol::encode(&ServerMessage::Connected { mode: state.mode }) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to encode handshake for {}: {}", id, e);
            return;
        }
    };
    if !subscriber.try_send_raw(Message::Text(connected.into())) {
        return;
    }
    state.registry.register(subscriber.clone());

    counter!("hub_connections_total").increment(1);
    info!(
        "Subscriber {} connected ({} total)",
        id,
        state.registry.subscriber_count()
    );

    // Forward queued messages to the socket. This task owns the actual
    // network writes; the broadcast loop only ever touches the channel.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut ping_interval = interval(Duration::from_secs(30));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Read-drain: the protocol is broadcast-only, inbound content is
    // consumed and discarded until the connection closes or errors.
    loop {
        tokio::select! {
            biased;

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if !subscriber.try_send_raw(Message::Pong(data)) {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket error for {}: {}", id, e);
                        break;
                    }
                }
            }

            // Keepalive; a subscriber whose queue is jammed gets dropped here.
            _ = ping_interval.tick() => {
                if !subscriber.try_send_raw(Message::Ping(vec![].into())) {
                    break;
                }
            }
        }
    }

    state.registry.unregister(&id);
    send_task.abort();

    counter!("hub_disconnections_total").increment(1);
    info!(
        "Subscriber {} disconnected ({} total)",
        id,
        state.registry.subscriber_count()
    );
}
