//! Broadcast hub holding the registry of connected event streams.
//!
//! # Architecture
//!
//! ```text
//!   publish(type, data)
//!          │  stamp under registry lock
//!          ▼
//!   ┌──────────────────────────────┐
//!   │ BroadcastHub                 │
//!   │  stream-a ─► sink.send() ok  │
//!   │  stream-b ─► sink.send() err │──► evicted after the pass
//!   │  stream-c ─► sink.send() ok  │
//!   └──────────────────────────────┘
//!          │
//!          ▼
//!     delivered = 2
//! ```
//!
//! # Thread Safety
//!
//! A single `Mutex` guards the registry and the last issued stamp. Fan-out
//! holds it for the whole iterate-then-evict sequence; sink writes are
//! non-blocking enqueues, so the critical section never awaits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value as JsonValue;

use crate::domain::events::{encode_frame, Envelope, EventType};
use crate::domain::foundation::{StreamId, Timestamp};
use crate::ports::{EventPublisher, EventSink, SinkError};

/// Server-side registration of one client's open transport.
struct ConnectedStream {
    sink: Arc<dyn EventSink>,
    connected_at: Timestamp,
}

#[derive(Default)]
struct HubState {
    streams: HashMap<StreamId, ConnectedStream>,
    last_stamp: Option<Timestamp>,
}

impl HubState {
    /// Issues the next envelope stamp, never earlier than the previous one.
    fn next_stamp(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let stamp = match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// Fans envelopes out to every connected stream, pruning dead ones.
///
/// Owned explicitly (usually behind an `Arc`) rather than as a global, so
/// independent hubs can coexist in tests.
#[derive(Default)]
pub struct BroadcastHub {
    state: Mutex<HubState>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create as an Arc (for sharing with handlers and publishers).
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a connected stream.
    ///
    /// Ids are expected to be unique (see [`StreamId::generate`]). A
    /// duplicate replaces the earlier sink.
    pub fn register(&self, id: StreamId, sink: Arc<dyn EventSink>) {
        let mut state = self.lock();
        let stream = ConnectedStream {
            sink,
            connected_at: Timestamp::now(),
        };
        if state.streams.insert(id.clone(), stream).is_some() {
            tracing::warn!(stream_id = %id, "Duplicate stream id registered, replacing sink");
        }
        tracing::info!(
            stream_id = %id,
            total = state.streams.len(),
            "Client connected to event stream"
        );
    }

    /// Removes a connected stream if present.
    ///
    /// Idempotent: returns `false` for unknown ids without error, so the
    /// voluntary-close and failed-write paths may both clean up.
    pub fn unregister(&self, id: &StreamId) -> bool {
        let mut state = self.lock();
        match state.streams.remove(id) {
            Some(stream) => {
                let duration = Timestamp::now().duration_since(&stream.connected_at);
                tracing::info!(
                    stream_id = %id,
                    duration_ms = duration.num_milliseconds(),
                    total = state.streams.len(),
                    "Client disconnected from event stream"
                );
                true
            }
            None => false,
        }
    }

    /// Writes the envelope to every registered stream.
    ///
    /// Streams whose write fails are evicted after the full pass. Returns
    /// the number of successful writes.
    pub fn fan_out(&self, envelope: &Envelope) -> usize {
        let frame = match encode_frame(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(event_type = %envelope.event_type, "Failed to encode envelope: {}", e);
                return 0;
            }
        };

        let mut state = self.lock();
        Self::fan_out_locked(&mut state, &frame)
    }

    fn fan_out_locked(state: &mut HubState, frame: &str) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, stream) in state.streams.iter() {
            match stream.sink.send(frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(stream_id = %id, "Write failed: {}", e);
                    failed.push(id.clone());
                }
            }
        }

        for id in &failed {
            if let Some(stream) = state.streams.remove(id) {
                let duration = Timestamp::now().duration_since(&stream.connected_at);
                tracing::warn!(
                    stream_id = %id,
                    duration_ms = duration.num_milliseconds(),
                    "Evicted stream after failed write"
                );
            }
        }

        tracing::debug!(
            delivered,
            failed = failed.len(),
            total = state.streams.len(),
            "Broadcast complete"
        );

        delivered
    }

    /// Stamps and fans out a new envelope; returns the delivered count.
    pub fn publish(&self, event_type: EventType, data: JsonValue) -> usize {
        let mut state = self.lock();
        let envelope = Envelope::new(event_type, data, state.next_stamp());

        match encode_frame(&envelope) {
            Ok(frame) => Self::fan_out_locked(&mut state, &frame),
            Err(e) => {
                tracing::error!(%event_type, "Failed to encode envelope: {}", e);
                0
            }
        }
    }

    /// Builds an envelope stamped from the hub clock without broadcasting it.
    ///
    /// Used for per-stream envelopes (welcome, heartbeat).
    pub fn envelope(&self, event_type: EventType, data: JsonValue) -> Envelope {
        let stamp = self.lock().next_stamp();
        Envelope::new(event_type, data, stamp)
    }

    /// Writes an envelope to a single stream's sink.
    pub fn send_to(&self, sink: &dyn EventSink, envelope: &Envelope) -> Result<(), SinkError> {
        let frame = encode_frame(envelope).map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        sink.send(&frame)
    }

    /// Returns true if the stream is still registered.
    pub fn contains(&self, id: &StreamId) -> bool {
        self.lock().streams.contains_key(id)
    }

    /// Number of currently connected streams.
    pub fn client_count(&self) -> usize {
        self.lock().streams.len()
    }

    /// Ids of all connected streams (for diagnostics).
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.lock().streams.keys().cloned().collect()
    }
}

impl EventPublisher for BroadcastHub {
    fn publish(&self, event_type: EventType, data: JsonValue) -> usize {
        BroadcastHub::publish(self, event_type, data)
    }
}
