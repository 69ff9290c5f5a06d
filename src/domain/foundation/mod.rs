//! Foundation module - Shared domain primitives.
//!
//! Value objects and enums that form the vocabulary of the event
//! distribution core.

mod connection_status;
mod ids;
mod timestamp;

pub use connection_status::ConnectionStatus;
pub use ids::StreamId;
pub use timestamp::Timestamp;
