//! Dispatcher-side event stream client configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Connection Manager configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Event stream endpoint
    #[serde(default = "default_url")]
    pub url: String,

    /// Status endpoint polled in fallback mode (derived from `url` when unset)
    pub status_url: Option<String>,

    /// Base reconnect delay in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Retries before giving up on the stream
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Poll period in milliseconds once in fallback mode
    #[serde(default = "default_polling_interval")]
    pub polling_interval_ms: u64,

    /// Degrade to polling when retries are exhausted
    #[serde(default = "default_enable_polling_fallback")]
    pub enable_polling_fallback: bool,
}

impl ClientConfig {
    /// Create a config for the given stream endpoint with default timings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_status_url(mut self, url: impl Into<String>) -> Self {
        self.status_url = Some(url.into());
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_polling_fallback(mut self, enabled: bool) -> Self {
        self.enable_polling_fallback = enabled;
        self
    }

    /// Get base reconnect delay as Duration
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Get polling interval as Duration
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    /// Delay before retry number `attempt` (1-based): linear, capped at 3x base.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.reconnect_delay() * attempt.clamp(1, 3)
    }

    /// Status endpoint; defaults to the stream URL with `/stream` replaced by `/status`.
    pub fn status_url(&self) -> String {
        if let Some(url) = &self.status_url {
            return url.clone();
        }
        match self.url.strip_suffix("/stream") {
            Some(base) => format!("{}/status", base),
            None => format!("{}/status", self.url.trim_end_matches('/')),
        }
    }

    /// Validate client configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_http_url(&self.url) {
            return Err(ValidationError::InvalidStreamUrl);
        }
        if let Some(status_url) = &self.status_url {
            if !is_http_url(status_url) {
                return Err(ValidationError::InvalidStatusUrl);
            }
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ValidationError::InvalidReconnectDelay);
        }
        if self.enable_polling_fallback && self.polling_interval_ms == 0 {
            return Err(ValidationError::InvalidPollingInterval);
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            status_url: None,
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            polling_interval_ms: default_polling_interval(),
            enable_polling_fallback: default_enable_polling_fallback(),
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn default_url() -> String {
    "http://127.0.0.1:8080/api/events/stream".to_string()
}

fn default_reconnect_delay() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_polling_interval() -> u64 {
    5000
}

fn default_enable_polling_fallback() -> bool {
    true
}
