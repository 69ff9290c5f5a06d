//! HTTP transport for the dispatcher-side event stream.
//!
//! Opens `GET <url>` with `Accept: text/event-stream` and hands the body
//! through as raw chunks; framing is left to the caller. Status polls are
//! plain JSON requests with a short per-request timeout.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::ports::{ByteStream, EventTransport, TransportError};

const EVENT_STREAM_MIME: &str = "text/event-stream";

/// reqwest-backed [`EventTransport`].
#[derive(Debug, Clone)]
pub struct HttpEventTransport {
    client: Client,
    stream_url: String,
    status_url: String,
    status_timeout: Duration,
}

impl HttpEventTransport {
    /// Builds a transport for the endpoints named in `config`.
    ///
    /// The client carries a connect timeout only; the stream itself is
    /// long-lived and must not be cut off by a whole-request timeout.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Connect(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            stream_url: config.url.clone(),
            status_url: config.status_url(),
            status_timeout: config.polling_interval().max(Duration::from_secs(1)),
        })
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn open(&self) -> Result<ByteStream, TransportError> {
        let response = self
            .client
            .get(&self.stream_url)
            .header(ACCEPT, EVENT_STREAM_MIME)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with(EVENT_STREAM_MIME) {
            return Err(TransportError::InvalidResponse(format!(
                "expected {}, got {:?}",
                EVENT_STREAM_MIME, content_type
            )));
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::Interrupted(e.to_string()))
        });

        Ok(Box::pin(stream))
    }

    async fn fetch_status(&self) -> Result<JsonValue, TransportError> {
        let response = self
            .client
            .get(&self.status_url)
            .header(ACCEPT, "application/json")
            .timeout(self.status_timeout)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        response
            .json::<JsonValue>()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}
