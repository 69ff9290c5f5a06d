//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::Timestamp;

/// Unique identifier for one connected event stream.
///
/// Generated server-side when a client opens the stream endpoint. The
/// format is `<unix millis>-<8 hex chars>`: time-ordered for log reading,
/// with a random suffix so concurrent connects in the same millisecond
/// do not collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Generates a fresh id from the current time and a random suffix.
    pub fn generate() -> Self {
        Self::generate_at(Timestamp::now())
    }

    /// Generates an id anchored at the given time.
    pub fn generate_at(at: Timestamp) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", at.as_unix_millis(), &suffix[..8]))
    }

    /// Wraps an existing id string (e.g. one echoed back by the server).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_id_has_time_prefix_and_random_suffix() {
        let at = Timestamp::from_unix_millis(1_700_000_000_123);
        let id = StreamId::generate_at(at);

        let (prefix, suffix) = id.as_str().split_once('-').unwrap();
        assert_eq!(prefix, "1700000000123");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_generated_in_same_millisecond_differ() {
        let at = Timestamp::now();
        let ids: HashSet<StreamId> = (0..1000).map(|_| StreamId::generate_at(at)).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = StreamId::from_string("42-deadbeef");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42-deadbeef\"");
    }
}
