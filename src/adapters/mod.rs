//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `realtime` - Broadcast hub and the HTTP stream endpoint (server side)
//! - `client` - Connection Manager and HTTP transport (dispatcher side)

pub mod client;
pub mod realtime;

pub use client::{ConnectionManager, EventDispatcher, HttpEventTransport};
pub use realtime::{realtime_router, BroadcastHub, RealtimeState};
