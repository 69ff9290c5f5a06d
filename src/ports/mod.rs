//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the distribution core and the outside world. Adapters implement these ports.
//!
//! ## Server Ports
//!
//! - `EventSink` - Write handle to one connected client's transport
//! - `EventPublisher` - The "publish event" call exposed to mutation-side collaborators
//!
//! ## Client Ports
//!
//! - `EventTransport` - Opens the event stream and performs status polls
//! - `ConnectionObserver` - Consumer contract for envelopes, status and terminal errors

mod connection_observer;
mod event_publisher;
mod event_sink;
mod event_transport;

pub use connection_observer::{ConnectionError, ConnectionObserver};
pub use event_publisher::EventPublisher;
pub use event_sink::{EventSink, SinkError};
pub use event_transport::{ByteStream, EventTransport, TransportError};
