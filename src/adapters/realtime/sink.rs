//! Channel-backed [`EventSink`] feeding an HTTP response body.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::{Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::domain::foundation::StreamId;
use crate::ports::{EventSink, SinkError};

use super::hub::BroadcastHub;

/// Sink half: frames are queued without blocking.
///
/// A write fails as soon as the receiving body has been dropped, which is
/// how a vanished client is detected.
pub struct ChannelSink {
    tx: UnboundedSender<String>,
}

impl EventSink for ChannelSink {
    fn send(&self, frame: &str) -> Result<(), SinkError> {
        self.tx
            .unbounded_send(frame.to_string())
            .map_err(|_| SinkError::Closed)
    }
}

/// Creates a connected sink/receiver pair.
pub fn channel_sink() -> (Arc<ChannelSink>, UnboundedReceiver<String>) {
    let (tx, rx) = unbounded();
    (Arc::new(ChannelSink { tx }), rx)
}

/// Response body for one event stream.
///
/// Owns the receiving end of the stream's channel. When the HTTP layer
/// drops the body (client went away) the guard unregisters the stream and
/// stops its heartbeat.
pub struct StreamGuard {
    id: StreamId,
    rx: UnboundedReceiver<String>,
    hub: Arc<BroadcastHub>,
    heartbeat: Option<JoinHandle<()>>,
}

impl StreamGuard {
    pub(crate) fn new(
        id: StreamId,
        rx: UnboundedReceiver<String>,
        hub: Arc<BroadcastHub>,
        heartbeat: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            id,
            rx,
            hub,
            heartbeat,
        }
    }

    /// The id this stream is registered under.
    pub fn id(&self) -> &StreamId {
        &self.id
    }
}

impl Stream for StreamGuard {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx).map(|frame| frame.map(Ok))
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if self.hub.unregister(&self.id) {
            tracing::debug!(stream_id = %self.id, "Event stream closed by client");
        }
    }
}
