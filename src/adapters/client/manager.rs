//! Connection Manager - owns one subscription to the event stream.
//!
//! ```text
//!                 connect()
//!  disconnected ────────────► connecting ──open ok──► connected
//!       ▲                       │    ▲                   │
//!       │                 fail  │    │ retry timer       │ drop / error
//!       │                       ▼    │                   │
//!       │                    reconnecting ◄──────────────┘
//!       │                       │
//!       │  attempts exhausted   ├── fallback enabled ──► polling
//!       └───────────────────────┘   (no fallback: error)
//! ```
//!
//! The transport reader, the retry timer and the polling timer are tokio
//! tasks. At most one reader and at most one timer exist at a time; a timer
//! is either a retry or a poll, never both. Every callback from a spawned
//! task is checked against the current reader generation (or timer id) so a
//! task that lost a race with `disconnect()` cannot change state.
//!
//! Observer notifications are queued while the state lock is held and
//! delivered after it is released, in the order they were produced.

use futures::StreamExt;
use serde_json::{json, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::ClientConfig;
use crate::domain::events::{Envelope, EventType, SseFrameDecoder};
use crate::domain::foundation::{ConnectionStatus, StreamId, Timestamp};
use crate::ports::{ConnectionError, ConnectionObserver, EventTransport, TransportError};

const MIN_POLL_PERIOD: Duration = Duration::from_millis(10);

/// Which timer, if any, a manager is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTimer {
    Retry,
    Polling,
}

/// Point-in-time view of a manager's subscription state.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
    pub last_event_timestamp: Option<Timestamp>,
    /// Id the server assigned in its `connection` envelope.
    pub stream_id: Option<StreamId>,
    pub transport_open: bool,
    pub pending_timer: Option<PendingTimer>,
}

/// Client-side subscription to the event stream with retry and polling fallback.
///
/// Dropping the manager disconnects it.
///
/// # Panics
///
/// `connect()` and `reconnect()` spawn tokio tasks and panic when called
/// outside a tokio runtime.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

/// Weak, cloneable control handle for a [`ConnectionManager`].
///
/// Lets observers call `disconnect()`/`reconnect()` from inside their
/// callbacks without owning the manager. Calls become no-ops once the
/// manager is dropped.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Weak<Inner>,
}

struct Inner {
    config: ClientConfig,
    transport: Arc<dyn EventTransport>,
    observer: Arc<dyn ConnectionObserver>,
    state: Mutex<ManagerState>,
    draining: AtomicBool,
}

#[derive(Default)]
struct ManagerState {
    status: ConnectionStatus,
    reconnect_attempts: u32,
    last_event_timestamp: Option<Timestamp>,
    stream_id: Option<StreamId>,
    destroyed: bool,
    released: bool,
    generation: u64,
    next_timer_id: u64,
    reader: Option<JoinHandle<()>>,
    timer: Option<Timer>,
    outbox: VecDeque<Notification>,
}

struct Timer {
    id: u64,
    kind: PendingTimer,
    handle: JoinHandle<()>,
}

enum Notification {
    Status(ConnectionStatus),
    Event(Envelope),
    Error(ConnectionError),
}

impl ConnectionManager {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn EventTransport>,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                observer,
                state: Mutex::new(ManagerState::default()),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Opens the stream. No-op after `disconnect()` or while a transport is open.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Tears everything down and stays down until `reconnect()`.
    ///
    /// Idempotent. All timers and the transport are cancelled before this returns.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Full teardown followed by a fresh `connect()` with the attempt counter reset.
    ///
    /// This is the only way out of `polling`.
    pub fn reconnect(&self) {
        self.inner.reconnect();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.lock().released = true;
        self.inner.disconnect();
    }
}

impl ConnectionHandle {
    pub fn connect(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.connect();
        }
    }

    pub fn disconnect(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.disconnect();
        }
    }

    pub fn reconnect(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.reconnect();
        }
    }

    /// Current status, or `Disconnected` once the manager is gone.
    pub fn status(&self) -> ConnectionStatus {
        self.inner
            .upgrade()
            .map(|inner| inner.lock().status)
            .unwrap_or_default()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connect(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.destroyed || state.released || state.reader.is_some() {
                return;
            }
            self.start_connect(&mut state);
        }
        self.flush();
    }

    fn disconnect(&self) {
        {
            let mut state = self.lock();
            state.teardown();
        }
        self.flush();
    }

    fn reconnect(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.released {
                return;
            }
            state.teardown();
            state.destroyed = false;
            state.reconnect_attempts = 0;
            tracing::info!(url = %self.config.url, "Manual reconnect requested");
            self.start_connect(&mut state);
        }
        self.flush();
    }

    fn start_connect(self: &Arc<Self>, state: &mut ManagerState) {
        // A pending poll keeps running until the new transport is confirmed open.
        if state.timer.as_ref().map(|t| t.kind) == Some(PendingTimer::Retry) {
            state.cancel_timer();
        }

        state.generation += 1;
        state.stream_id = None;
        state.set_status(ConnectionStatus::Connecting);

        let generation = state.generation;
        let inner = Arc::clone(self);
        state.reader = Some(tokio::spawn(inner.run_reader(generation)));
    }

    async fn run_reader(self: Arc<Self>, generation: u64) {
        let mut stream = match self.transport.open().await {
            Ok(stream) => stream,
            Err(err) => {
                self.handle_failure(generation, err);
                return;
            }
        };

        if !self.on_open(generation) {
            return;
        }

        let mut decoder = SseFrameDecoder::new();
        let error = loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    for frame in decoder.push(&chunk) {
                        match frame {
                            Ok(envelope) => {
                                if !self.on_envelope(generation, envelope) {
                                    return;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "Dropping malformed envelope");
                            }
                        }
                    }
                }
                Some(Err(err)) => break err,
                None => break TransportError::Interrupted("stream closed by server".to_string()),
            }
        };

        self.handle_failure(generation, error);
    }

    fn on_open(&self, generation: u64) -> bool {
        {
            let mut state = self.lock();
            if !state.is_current(generation) {
                return false;
            }
            state.reconnect_attempts = 0;
            state.cancel_timer();
            state.set_status(ConnectionStatus::Connected);
            tracing::info!(url = %self.config.url, "Event stream connected");
        }
        self.flush();
        true
    }

    fn on_envelope(&self, generation: u64, envelope: Envelope) -> bool {
        {
            let mut state = self.lock();
            if !state.is_current(generation) {
                return false;
            }
            state.record(envelope);
        }
        self.flush();
        true
    }

    fn handle_failure(self: &Arc<Self>, generation: u64, error: TransportError) {
        {
            let mut state = self.lock();
            if !state.is_current(generation) {
                return;
            }

            // The failing reader is the caller; let it finish on its own.
            state.reader = None;
            state.cancel_timer();

            if state.reconnect_attempts < self.config.max_reconnect_attempts {
                state.reconnect_attempts += 1;
                let attempt = state.reconnect_attempts;
                let delay = self.config.retry_delay(attempt);
                tracing::warn!(
                    error = %error,
                    attempt,
                    max_attempts = self.config.max_reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Event stream lost, scheduling reconnect"
                );
                state.set_status(ConnectionStatus::Reconnecting);

                let id = state.allocate_timer_id();
                let inner = Arc::clone(self);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.fire_retry(id);
                });
                state.timer = Some(Timer {
                    id,
                    kind: PendingTimer::Retry,
                    handle,
                });
            } else if self.config.enable_polling_fallback {
                tracing::warn!(
                    error = %error,
                    interval_ms = self.config.polling_interval_ms,
                    "Reconnect attempts exhausted, falling back to polling"
                );
                state.set_status(ConnectionStatus::Polling);

                let id = state.allocate_timer_id();
                let inner = Arc::clone(self);
                let handle = tokio::spawn(inner.run_polling(id));
                state.timer = Some(Timer {
                    id,
                    kind: PendingTimer::Polling,
                    handle,
                });
            } else {
                let error = ConnectionError::new(format!(
                    "Event stream unavailable after {} reconnect attempts: {}",
                    state.reconnect_attempts, error
                ));
                tracing::error!(error = %error, "Event stream recovery exhausted");
                // Observers see the error before the status that ends recovery.
                state.outbox.push_back(Notification::Error(error));
                state.set_status(ConnectionStatus::Disconnected);
            }
        }
        self.flush();
    }

    fn fire_retry(self: &Arc<Self>, id: u64) {
        {
            let mut state = self.lock();
            if state.destroyed || !state.timer_matches(id, PendingTimer::Retry) {
                return;
            }
            // This task is the timer; dropping the handle detaches it.
            state.timer = None;
            if state.reader.is_some() {
                return;
            }
            self.start_connect(&mut state);
        }
        self.flush();
    }

    async fn run_polling(self: Arc<Self>, id: u64) {
        let period = self.config.polling_interval().max(MIN_POLL_PERIOD);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let result = self.transport.fetch_status().await;
            if !self.on_poll(id, result) {
                return;
            }
        }
    }

    fn on_poll(&self, id: u64, result: Result<JsonValue, TransportError>) -> bool {
        {
            let mut state = self.lock();
            if state.destroyed || !state.timer_matches(id, PendingTimer::Polling) {
                return false;
            }
            match result {
                Ok(body) => {
                    let envelope =
                        Envelope::new(EventType::Heartbeat, polling_payload(body), Timestamp::now());
                    state.record(envelope);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Status poll failed");
                }
            }
        }
        self.flush();
        true
    }

    /// Delivers queued notifications outside the state lock.
    ///
    /// Only one caller drains at a time; notifications queued by a
    /// re-entrant call are picked up by the caller already draining.
    fn flush(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            {
                let _draining = DrainGuard(&self.draining);
                loop {
                    let next = self.lock().outbox.pop_front();
                    match next {
                        Some(notification) => self.deliver(notification),
                        None => break,
                    }
                }
            }

            if self.lock().outbox.is_empty() {
                return;
            }
        }
    }

    fn deliver(&self, notification: Notification) {
        match notification {
            Notification::Status(status) => self.observer.on_status_change(status),
            Notification::Event(envelope) => self.observer.on_event(envelope),
            Notification::Error(error) => self.observer.on_error(&error),
        }
    }
}

impl ManagerState {
    fn is_current(&self, generation: u64) -> bool {
        !self.destroyed && self.generation == generation
    }

    fn timer_matches(&self, id: u64, kind: PendingTimer) -> bool {
        matches!(&self.timer, Some(timer) if timer.id == id && timer.kind == kind)
    }

    fn allocate_timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    fn teardown(&mut self) {
        self.destroyed = true;
        self.cancel_timer();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        debug_assert!(
            self.status.can_transition_to(&status),
            "invalid transition {} -> {}",
            self.status,
            status
        );
        tracing::debug!(from = %self.status, to = %status, "Connection status changed");
        self.status = status;
        self.outbox.push_back(Notification::Status(status));
    }

    fn record(&mut self, envelope: Envelope) {
        self.last_event_timestamp = Some(envelope.timestamp);
        if envelope.event_type == EventType::Connection {
            if let Some(id) = envelope.data.get("clientId").and_then(JsonValue::as_str) {
                self.stream_id = Some(StreamId::from_string(id));
            }
        }
        self.outbox.push_back(Notification::Event(envelope));
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status: self.status,
            reconnect_attempts: self.reconnect_attempts,
            last_event_timestamp: self.last_event_timestamp,
            stream_id: self.stream_id.clone(),
            transport_open: self.reader.is_some(),
            pending_timer: self.timer.as_ref().map(|timer| timer.kind),
        }
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shapes a status response into synthesized heartbeat data.
fn polling_payload(body: JsonValue) -> JsonValue {
    match body {
        JsonValue::Object(mut fields) => {
            fields.insert("source".to_string(), json!("polling"));
            JsonValue::Object(fields)
        }
        other => json!({ "source": "polling", "status": other }),
    }
}
