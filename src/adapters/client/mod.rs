//! Dispatcher-side adapters for consuming the event stream.
//!
//! # Components
//!
//! - [`manager`] - Connection Manager: state machine, retry timer, polling fallback
//! - [`transport`] - reqwest implementation of `EventTransport`
//! - [`dispatcher`] - Routes envelopes to per-type subscriber callbacks
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = EventDispatcher::new_shared();
//! dispatcher.subscribe(EventType::FlashMessage, |envelope| show_banner(envelope));
//!
//! let transport = Arc::new(HttpEventTransport::new(&config.client)?);
//! let manager = ConnectionManager::new(config.client.clone(), transport, dispatcher.clone());
//! manager.connect();
//! ```

pub mod dispatcher;
pub mod manager;
pub mod transport;

pub use dispatcher::{EnvelopeHandler, EventDispatcher, SubscriptionId, SubscriptionSet};
pub use manager::{ConnectionHandle, ConnectionManager, ConnectionSnapshot, PendingTimer};
pub use transport::HttpEventTransport;
