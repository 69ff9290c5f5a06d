//! The unit of transmission shared by the hub and its subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::Timestamp;

use super::EventType;

/// Typed, timestamped unit of data broadcast over the event stream.
///
/// JSON shape: `{ "type": "<tag>", "data": <any>, "timestamp": "<ISO-8601 UTC>" }`.
/// The payload is never interpreted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: JsonValue,
    pub timestamp: Timestamp,
}

impl Envelope {
    /// Creates an envelope stamped with the given time.
    pub fn new(event_type: EventType, data: JsonValue, timestamp: Timestamp) -> Self {
        Self {
            event_type,
            data,
            timestamp,
        }
    }

    /// Deserializes the payload into a typed value.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}
