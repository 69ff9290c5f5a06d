//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Heartbeat interval must be between 1 and 300 seconds")]
    InvalidHeartbeatInterval,

    #[error("Event stream URL must use http or https")]
    InvalidStreamUrl,

    #[error("Status URL must use http or https")]
    InvalidStatusUrl,

    #[error("Reconnect delay must be greater than zero")]
    InvalidReconnectDelay,

    #[error("Polling interval must be greater than zero")]
    InvalidPollingInterval,
}
