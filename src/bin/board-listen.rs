//! `board-listen`: console dispatcher that follows the event stream.
//!
//! Connects with the Connection Manager using the `client` config section and
//! logs every envelope and status change until Ctrl+C.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ops_board::adapters::client::{ConnectionManager, EventDispatcher, HttpEventTransport};
use ops_board::config::AppConfig;
use ops_board::domain::events::EventType;
use ops_board::domain::foundation::ConnectionStatus;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.client.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let dispatcher = EventDispatcher::new_shared();
    dispatcher.subscribe(EventType::Connection, |envelope| {
        tracing::info!(data = %envelope.data, "Stream opened");
    });
    dispatcher.subscribe(EventType::Heartbeat, |envelope| {
        tracing::debug!(timestamp = %envelope.timestamp, data = %envelope.data, "Heartbeat");
    });
    dispatcher.subscribe(EventType::FlashMessage, |envelope| {
        tracing::warn!(data = %envelope.data, "FLASH MESSAGE");
    });
    dispatcher.subscribe_all(|envelope| {
        if envelope.event_type.is_core() {
            return;
        }
        tracing::info!(
            event_type = %envelope.event_type,
            timestamp = %envelope.timestamp,
            data = %envelope.data,
            "Board update"
        );
    });

    let transport = Arc::new(HttpEventTransport::new(&config.client)?);
    let manager = ConnectionManager::new(config.client.clone(), transport, dispatcher.clone());

    let mut status = dispatcher.status();
    manager.connect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, disconnecting");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                tracing::info!(status = %current, "Connection status");
                if current == ConnectionStatus::Disconnected {
                    if let Some(error) = dispatcher.last_error() {
                        tracing::error!(error = %error, "Giving up on event stream");
                    }
                    break;
                }
            }
        }
    }

    manager.disconnect();
    Ok(())
}
