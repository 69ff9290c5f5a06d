//! EventTransport port - Client-side access to the event stream endpoint
//! and the diagnostic status endpoint used by the polling fallback.

use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value as JsonValue;
use std::pin::Pin;

/// Raw byte chunks read from an open event stream.
///
/// Chunk boundaries carry no meaning; framing is recovered by
/// [`SseFrameDecoder`](crate::domain::events::SseFrameDecoder).
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Transport-level failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Server unreachable, DNS failure, connection refused.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The stream ended or broke after it was opened.
    #[error("stream interrupted: {0}")]
    Interrupted(String),

    /// A status response could not be read.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Port for opening the event stream and polling the status endpoint.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open the long-lived stream.
    ///
    /// Resolves once the server has accepted the connection (response head
    /// received); the returned stream then yields body chunks until the
    /// connection ends.
    async fn open(&self) -> Result<ByteStream, TransportError>;

    /// Perform one lightweight status request.
    async fn fetch_status(&self) -> Result<JsonValue, TransportError>;
}
