//! ConnectionObserver port - The consumer contract of a Connection Manager.
//!
//! Application code (dashboards, stores) implements this trait to receive
//! envelopes, status changes and the single terminal error.

use serde::Serialize;

use crate::domain::events::Envelope;
use crate::domain::foundation::{ConnectionStatus, Timestamp};

/// Terminal failure surfaced to the owning application.
///
/// Only raised when retries are exhausted and polling is disabled; every
/// other failure is recovered inside the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message} (at {timestamp})")]
pub struct ConnectionError {
    pub message: String,
    pub timestamp: Timestamp,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Receiver of everything a Connection Manager reports.
///
/// Callbacks run outside the manager's internal lock, so they may call
/// `disconnect()` or `reconnect()` on the manager. They should return
/// quickly; the stream read loop waits on `on_event`.
pub trait ConnectionObserver: Send + Sync {
    /// A parsed envelope arrived (or was synthesized by polling).
    fn on_event(&self, envelope: Envelope);

    /// The manager moved to a new status.
    fn on_status_change(&self, _status: ConnectionStatus) {}

    /// Recovery is exhausted; no further automatic attempts will be made.
    fn on_error(&self, _error: &ConnectionError) {}
}
