//! Ops Board - Real-time event distribution for the dispatch operations board
//!
//! The server side fans state-change envelopes out to every connected
//! dispatcher over a text-event-stream; the client side keeps one
//! subscription alive with bounded retries and a polling fallback.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
