//! `ops-board` server: serves the event stream and status endpoints.

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ops_board::adapters::realtime::{realtime_router, BroadcastHub, RealtimeState};
use ops_board::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let hub: Arc<BroadcastHub> = BroadcastHub::new_shared();
    let state = RealtimeState::new(Arc::clone(&hub))
        .with_heartbeat_interval(config.stream.heartbeat_interval());

    let app = realtime_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %addr,
        environment = ?config.server.environment,
        heartbeat_secs = config.stream.heartbeat_interval_secs,
        "Ops board event stream listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(open_streams = hub.client_count(), "Server stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Ctrl+C received, shutting down");
}
