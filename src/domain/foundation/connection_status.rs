//! ConnectionStatus enum for the client-side subscription lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one Connection Manager.
///
/// ```text
/// disconnected ──► connecting ──► connected
///                     ▲   │           │
///                     │   ▼           ▼
///                   reconnecting ◄────┘
///                        │
///                        ▼
///                     polling   (no automatic way back to connected)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Polling,
}

impl ConnectionStatus {
    /// Returns true while a live stream is delivering envelopes.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Returns true for the states a UI should render as degraded.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Reconnecting | ConnectionStatus::Polling
        )
    }

    /// Validates a transition from this status to another.
    ///
    /// Every state may fall back to `Disconnected` (explicit teardown or
    /// terminal failure). `Polling` never reaches `Connected` directly; it
    /// is left through `Disconnected` (manual reconnect) or an explicit
    /// `connect()` call.
    pub fn can_transition_to(&self, target: &ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, target),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Reconnecting, Connecting)
                | (Polling, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Connected, Reconnecting)
                | (Connecting, Polling)
                | (Connected, Polling)
                | (Reconnecting, Polling)
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Polling => "polling",
        };
        write!(f, "{}", s)
    }
}
