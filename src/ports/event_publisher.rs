//! EventPublisher port - The single "publish event" call exposed to
//! mutation-side collaborators (storage, admin actions).
//!
//! Producers hand over the kind of change and its payload; stamping,
//! framing and fan-out happen behind this port.

use serde_json::Value as JsonValue;

use crate::domain::events::EventType;

/// Port for publishing state-change notifications to connected clients.
///
/// # Example
///
/// ```ignore
/// let delivered = publisher.publish(EventType::VehicleStatusChanged, json!({
///     "vehicle": "HLF 20",
///     "status": 2,
/// }));
/// tracing::debug!(delivered, "vehicle status published");
/// ```
pub trait EventPublisher: Send + Sync {
    /// Publish one notification.
    ///
    /// Returns the number of streams that accepted the write. The count is
    /// for observability only; producers never re-publish on a low count.
    fn publish(&self, event_type: EventType, data: JsonValue) -> usize;
}
