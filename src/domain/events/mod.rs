//! Event envelopes and their wire codec.
//!
//! - [`EventType`] - Enumerated wire tags
//! - [`Envelope`] - `{ type, data, timestamp }` unit of transmission
//! - [`encode_frame`] / [`decode_frame`] / [`SseFrameDecoder`] - text-event-stream framing

mod codec;
mod envelope;
mod event_type;

pub use codec::{decode_frame, encode_frame, SseFrameDecoder};
pub use envelope::Envelope;
pub use event_type::EventType;

/// Errors raised while encoding or decoding envelope frames.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid envelope json: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
