//! EventSink port - Write handle to one client's long-lived transport.
//!
//! The stream endpoint creates the sink and owns its lifetime; the hub only
//! holds a shared reference for fan-out.

/// Errors returned by a sink write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The remote side is gone; the stream must be evicted.
    #[error("sink closed")]
    Closed,

    /// Any other transport-specific failure.
    #[error("sink write failed: {0}")]
    WriteFailed(String),
}

/// Port for writing encoded frames to a connected client.
///
/// `send` must not block: it either enqueues the frame for delivery or
/// reports failure immediately. The hub calls it while holding its
/// registry lock, so an implementation must never call back into the hub.
pub trait EventSink: Send + Sync {
    /// Enqueue one complete wire frame.
    fn send(&self, frame: &str) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn EventSink) {}

    #[test]
    fn sink_error_messages() {
        assert_eq!(SinkError::Closed.to_string(), "sink closed");
        assert_eq!(
            SinkError::WriteFailed("reset".into()).to_string(),
            "sink write failed: reset"
        );
    }
}
