//! Server-side event stream configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Stream endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Seconds between keep-alive heartbeats on each open stream
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

impl StreamConfig {
    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Validate stream configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.heartbeat_interval_secs == 0 || self.heartbeat_interval_secs > 300 {
            return Err(ValidationError::InvalidHeartbeatInterval);
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    30
}
