//! Stream endpoint and diagnostic status endpoint.
//!
//! Per connection:
//! 1. Generate a unique stream id
//! 2. Open a channel-backed sink
//! 3. Register it with the hub
//! 4. Write the `connection` welcome envelope
//! 5. Heartbeat on a fixed interval until the client goes away
//! 6. Unregister and stop the heartbeat on close (see [`StreamGuard`])

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use http::header;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tokio::time::{interval_at, Instant};

use crate::domain::events::EventType;
use crate::domain::foundation::{StreamId, Timestamp};
use crate::ports::EventSink;

use super::hub::BroadcastHub;
use super::sink::{channel_sink, StreamGuard};

/// Default keep-alive period, chosen to beat common proxy idle timeouts.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

const WELCOME_MESSAGE: &str = "Connected to operations board event stream";

/// State required for the realtime endpoints.
#[derive(Clone)]
pub struct RealtimeState {
    pub hub: Arc<BroadcastHub>,
    pub heartbeat_interval: Duration,
}

impl RealtimeState {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self {
            hub,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

/// Response body of the diagnostic status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub connected_clients: usize,
    pub timestamp: Timestamp,
}

/// Accepts one connection and binds it into the hub.
///
/// Must be called from within a tokio runtime (spawns the heartbeat task).
pub fn open_stream(hub: &Arc<BroadcastHub>, heartbeat_interval: Duration) -> StreamGuard {
    let id = StreamId::generate();
    let (sink, rx) = channel_sink();

    let heartbeat = bind_stream(hub, id.clone(), sink, heartbeat_interval);
    StreamGuard::new(id, rx, hub.clone(), Some(heartbeat))
}

/// Registers the sink, sends the welcome envelope and starts the heartbeat.
fn bind_stream(
    hub: &Arc<BroadcastHub>,
    id: StreamId,
    sink: Arc<dyn EventSink>,
    heartbeat_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    hub.register(id.clone(), sink.clone());

    let welcome = hub.envelope(
        EventType::Connection,
        json!({
            "clientId": id,
            "message": WELCOME_MESSAGE,
            "serverTime": Timestamp::now(),
        }),
    );
    if let Err(e) = hub.send_to(sink.as_ref(), &welcome) {
        // Left for the next heartbeat/fan-out to evict.
        tracing::debug!(stream_id = %id, "Failed to send welcome envelope: {}", e);
    }

    spawn_heartbeat(hub.clone(), id, sink, heartbeat_interval)
}

fn spawn_heartbeat(
    hub: Arc<BroadcastHub>,
    id: StreamId,
    sink: Arc<dyn EventSink>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let heartbeat = hub.envelope(EventType::Heartbeat, JsonValue::Null);
            if let Err(e) = hub.send_to(sink.as_ref(), &heartbeat) {
                tracing::debug!(stream_id = %id, "Heartbeat failed, dropping stream: {}", e);
                hub.unregister(&id);
                break;
            }
            tracing::trace!(stream_id = %id, "Heartbeat sent");
        }
    })
}

/// Handle event stream requests.
///
/// Route: `GET /api/events/stream`
pub async fn stream_handler(State(state): State<RealtimeState>) -> impl IntoResponse {
    let guard = open_stream(&state.hub, state.heartbeat_interval);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Body::from_stream(guard),
    )
}

/// Report the number of connected clients.
///
/// Route: `GET /api/events/status`
///
/// Also the data source for the client's polling fallback.
pub async fn status_handler(State(state): State<RealtimeState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connected_clients: state.hub.client_count(),
        timestamp: Timestamp::now(),
    })
}

/// Create axum router for the realtime endpoints.
///
/// # Example
///
/// ```ignore
/// let app = realtime_router().with_state(RealtimeState::new(hub));
/// ```
pub fn realtime_router() -> Router<RealtimeState> {
    Router::new()
        .route("/api/events/stream", get(stream_handler))
        .route("/api/events/status", get(status_handler))
}
