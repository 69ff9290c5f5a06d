//! Server-side realtime adapters for pushing board changes to dispatchers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │           Mutation-side collaborators (storage, admin)              │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ EventPublisher::publish(type, data)
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         BroadcastHub                                │
//! │   - Stamps envelopes from the hub clock                             │
//! │   - Fans out to every registered sink, evicts failed writes         │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ data: <json>\n\n
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │               Stream endpoint (one per dispatcher)                  │
//! │   stream-1 ── welcome, heartbeat, fan-out ──► HTTP body             │
//! │   stream-2 ── welcome, heartbeat, fan-out ──► HTTP body             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`hub`] - Registry and fan-out
//! - [`sink`] - Channel-backed sink and the response-body guard
//! - [`handler`] - Axum handlers and router

pub mod handler;
pub mod hub;
pub mod sink;

pub use handler::{
    open_stream, realtime_router, status_handler, stream_handler, RealtimeState, StatusResponse,
    DEFAULT_HEARTBEAT_INTERVAL,
};
pub use hub::BroadcastHub;
pub use sink::{channel_sink, ChannelSink, StreamGuard};
