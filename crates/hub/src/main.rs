//! Hub service entry point.
//!
//! Fixed-rate telemetry broadcast to WebSocket subscribers, plus the
//! dashboard bundle on a separate port.

use anyhow::{Context, Result};
use clap::Parser;
use hub::{create_router, AppState, BroadcastLoop, PacketSource, SourceMode, SubscriberRegistry};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hub")]
#[command(about = "Real-time telemetry fan-out service")]
struct Args {
    /// Packet source: synthetic generator, or relay from an upstream agent
    #[arg(long, value_enum, default_value_t = SourceMode::Simulate)]
    mode: SourceMode,

    /// Upstream agent address for relay mode (host:port)
    #[arg(long, default_value = "localhost:50051")]
    relay_server: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting telemetry hub");

    // Read configuration from environment
    let ws_port: u16 = env::var("WS_PORT")
        .unwrap_or_else(|_| "8765".to_string())
        .parse()
        .expect("WS_PORT must be a number");
    let asset_port: u16 = env::var("ASSET_PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse()
        .expect("ASSET_PORT must be a number");
    let metrics_port: u16 = env::var("METRICS_PORT")
        .unwrap_or_else(|_| "9093".to_string())
        .parse()
        .expect("METRICS_PORT must be a number");
    let tick_rate_hz: f64 = env::var("TICK_RATE_HZ")
        .unwrap_or_else(|_| "60".to_string())
        .parse()
        .expect("TICK_RATE_HZ must be a number");
    let asset_dir = env::var("ASSET_DIR").unwrap_or_else(|_| "./dashboard".to_string());
    let vehicle_id = env::var("VEHICLE_ID").unwrap_or_else(|_| "AV-001".to_string());

    let tick_period = Duration::from_secs_f64(1.0 / tick_rate_hz);

    info!("Configuration:");
    info!("  Mode: {}", args.mode);
    info!("  Relay server: {}", args.relay_server);
    info!("  WS_PORT: {}", ws_port);
    info!("  ASSET_PORT: {}", asset_port);
    info!("  METRICS_PORT: {}", metrics_port);
    info!("  Tick rate: {} Hz", tick_rate_hz);
    info!("  Vehicle: {}", vehicle_id);

    // Start Prometheus metrics server
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], metrics_port))
        .install()
        .expect("Failed to start Prometheus exporter");
    info!("Prometheus metrics server started on port {}", metrics_port);

    // Bind both listeners up front so a taken port fails startup outright
    let ws_addr = SocketAddr::from(([0, 0, 0, 0], ws_port));
    let ws_listener = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("failed to bind subscriber port {}", ws_addr))?;
    let asset_addr = SocketAddr::from(([0, 0, 0, 0], asset_port));
    let asset_listener = TcpListener::bind(asset_addr)
        .await
        .with_context(|| format!("failed to bind static asset port {}", asset_addr))?;

    // Resolve the packet source; an unreachable upstream falls back to the
    // synthetic generator here, once, and the active mode reflects that.
    let source =
        PacketSource::for_mode(args.mode, &args.relay_server, &vehicle_id, tick_period).await;
    let mode = source.mode();
    if mode != args.mode {
        info!("Active mode: {}", mode);
    }

    // Create subscriber registry
    let registry = Arc::new(SubscriberRegistry::new());

    // Create shutdown channel for the broadcast loop
    let (loop_shutdown_tx, loop_shutdown_rx) = mpsc::channel(1);

    // Spawn broadcast loop task
    let broadcast = BroadcastLoop::new(source, registry.clone(), tick_period);
    let loop_handle = tokio::spawn(async move {
        if let Err(e) = broadcast.run(loop_shutdown_rx).await {
            error!("Broadcast loop error: {:?}", e);
        }
    });

    // Spawn static asset server
    let static_router = hub::static_assets::create_router(&asset_dir);
    info!("Dashboard on http://{} (dir: {})", asset_addr, asset_dir);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(asset_listener, static_router).await {
            error!("Static asset server error: {}", e);
        }
    });

    // Create application state and subscriber-facing router
    let state = Arc::new(AppState { registry, mode });
    let app = create_router(state);

    info!("Subscribers on ws://{}/ws", ws_addr);

    // Run server with graceful shutdown
    axum::serve(ws_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Shutdown broadcast loop
    info!("Shutting down broadcast loop...");
    let _ = loop_shutdown_tx.send(()).await;
    let _ = loop_handle.await;

    info!("Hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
