//! Wire tags identifying the kind of change carried by an envelope.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumerated `type` tag of an [`Envelope`](super::Envelope).
///
/// Only `Connection` and `Heartbeat` carry meaning inside the distribution
/// core. Every other variant is a domain notification that is fanned out
/// opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// Welcome envelope sent once per stream; carries the stream id.
    Connection,
    /// Keep-alive, or a result synthesized by the polling fallback.
    Heartbeat,
    /// A board message was posted.
    MessageSent,
    /// A board message was removed.
    MessageDeleted,
    /// An operational event (incident) was created.
    EventCreated,
    /// An operational event was updated.
    EventUpdated,
    /// An operational event was deleted.
    EventDeleted,
    /// A vehicle reported a new status.
    VehicleStatusChanged,
    /// The duty roster changed.
    RosterUpdated,
    /// An urgent flash message was raised or cleared.
    FlashMessage,
}

impl EventType {
    /// All domain notification kinds (excludes the core-defined tags).
    pub const DOMAIN: &'static [EventType] = &[
        EventType::MessageSent,
        EventType::MessageDeleted,
        EventType::EventCreated,
        EventType::EventUpdated,
        EventType::EventDeleted,
        EventType::VehicleStatusChanged,
        EventType::RosterUpdated,
        EventType::FlashMessage,
    ];

    /// Returns true for tags whose meaning is defined by the core itself.
    pub fn is_core(&self) -> bool {
        matches!(self, EventType::Connection | EventType::Heartbeat)
    }

    /// The wire string for this tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Connection => "connection",
            EventType::Heartbeat => "heartbeat",
            EventType::MessageSent => "message-sent",
            EventType::MessageDeleted => "message-deleted",
            EventType::EventCreated => "event-created",
            EventType::EventUpdated => "event-updated",
            EventType::EventDeleted => "event-deleted",
            EventType::VehicleStatusChanged => "vehicle-status-changed",
            EventType::RosterUpdated => "roster-updated",
            EventType::FlashMessage => "flash-message",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_kebab_case_wire_strings() {
        let json = serde_json::to_string(&EventType::VehicleStatusChanged).unwrap();
        assert_eq!(json, "\"vehicle-status-changed\"");
    }

    #[test]
    fn as_str_matches_serde_for_every_variant() {
        let all = [EventType::Connection, EventType::Heartbeat]
            .iter()
            .chain(EventType::DOMAIN.iter());
        for event_type in all {
            let json = serde_json::to_string(event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type.as_str()));
        }
    }

    #[test]
    fn only_connection_and_heartbeat_are_core() {
        assert!(EventType::Connection.is_core());
        assert!(EventType::Heartbeat.is_core());
        assert!(EventType::DOMAIN.iter().all(|t| !t.is_core()));
    }

    #[test]
    fn unknown_tag_fails_to_deserialize() {
        let result: Result<EventType, _> = serde_json::from_str("\"bonfire-approved\"");
        assert!(result.is_err());
    }
}
