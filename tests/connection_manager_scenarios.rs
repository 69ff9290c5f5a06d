//! Integration tests for the Connection Manager state machine.
//!
//! These tests drive a manager against a scripted transport on a paused
//! tokio clock:
//! 1. Successful connect and in-order delivery
//! 2. Capped linear retry delays ending in polling fallback
//! 3. Terminal failure with polling disabled
//! 4. Manual reconnect out of polling
//! 5. Disconnect idempotence, including from inside an observer callback

use async_trait::async_trait;
use futures::channel::mpsc;
use serde_json::{json, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::time::Instant;

use ops_board::adapters::client::{
    ConnectionHandle, ConnectionManager, EventDispatcher, PendingTimer,
};
use ops_board::config::ClientConfig;
use ops_board::domain::events::{encode_frame, Envelope, EventType};
use ops_board::domain::foundation::{ConnectionStatus, Timestamp};
use ops_board::ports::{ByteStream, ConnectionError, ConnectionObserver, EventTransport, TransportError};

// =============================================================================
// Test Infrastructure
// =============================================================================

type Feed = mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>;

enum Step {
    Fail,
    Open(mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>),
}

/// Transport that plays back a script of open outcomes.
///
/// Once the script runs out every open fails.
#[derive(Default)]
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    polls: Mutex<VecDeque<Result<JsonValue, TransportError>>>,
    opens: Mutex<Vec<Instant>>,
    poll_count: Mutex<usize>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn fail_next(&self, times: usize) {
        let mut steps = self.steps.lock().unwrap();
        for _ in 0..times {
            steps.push_back(Step::Fail);
        }
    }

    fn accept_next(&self) -> Feed {
        let (tx, rx) = mpsc::unbounded();
        self.steps.lock().unwrap().push_back(Step::Open(rx));
        tx
    }

    fn script_poll(&self, result: Result<JsonValue, TransportError>) {
        self.polls.lock().unwrap().push_back(result);
    }

    fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    fn open_gaps(&self) -> Vec<Duration> {
        let opens = self.opens.lock().unwrap();
        opens.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    fn poll_count(&self) -> usize {
        *self.poll_count.lock().unwrap()
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn open(&self) -> Result<ByteStream, TransportError> {
        self.opens.lock().unwrap().push(Instant::now());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Open(rx)) => Ok(Box::pin(rx)),
            Some(Step::Fail) | None => Err(TransportError::Connect("connection refused".to_string())),
        }
    }

    async fn fetch_status(&self) -> Result<JsonValue, TransportError> {
        *self.poll_count.lock().unwrap() += 1;
        let scripted = self.polls.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(json!({"connectedClients": 3})))
    }
}

/// Observer that records everything and can disconnect on a given status.
#[derive(Default)]
struct RecordingObserver {
    statuses: Mutex<Vec<ConnectionStatus>>,
    events: Mutex<Vec<Envelope>>,
    errors: Mutex<Vec<ConnectionError>>,
    /// Last status each error was delivered after.
    status_at_error: Mutex<Vec<Option<ConnectionStatus>>>,
    disconnect_on: Mutex<Option<ConnectionStatus>>,
    handle: OnceLock<ConnectionHandle>,
}

impl RecordingObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn statuses(&self) -> Vec<ConnectionStatus> {
        self.statuses.lock().unwrap().clone()
    }

    fn event_types(&self) -> Vec<EventType> {
        self.events.lock().unwrap().iter().map(|e| e.event_type).collect()
    }

    fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl ConnectionObserver for RecordingObserver {
    fn on_event(&self, envelope: Envelope) {
        self.events.lock().unwrap().push(envelope);
    }

    fn on_status_change(&self, status: ConnectionStatus) {
        self.statuses.lock().unwrap().push(status);
        let trigger = *self.disconnect_on.lock().unwrap();
        if trigger == Some(status) {
            if let Some(handle) = self.handle.get() {
                handle.disconnect();
            }
        }
    }

    fn on_error(&self, error: &ConnectionError) {
        self.errors.lock().unwrap().push(error.clone());
        let last = self.statuses.lock().unwrap().last().copied();
        self.status_at_error.lock().unwrap().push(last);
    }
}

fn config() -> ClientConfig {
    ClientConfig::new("http://board.test/api/events/stream")
}

fn frame(event_type: EventType, data: JsonValue) -> Vec<u8> {
    let envelope = Envelope::new(event_type, data, Timestamp::now());
    encode_frame(&envelope).unwrap().into_bytes()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// =============================================================================
// Successful connection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn connects_through_connecting_to_connected() {
    let transport = ScriptedTransport::new();
    let _feed = transport.accept_next();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());

    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    manager.connect();
    settle().await;

    assert_eq!(
        observer.statuses(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert!(snapshot.transport_open);
    assert_eq!(snapshot.pending_timer, None);
}

#[tokio::test(start_paused = true)]
async fn delivers_messages_in_arrival_order() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept_next();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());

    manager.connect();
    let mut batch = frame(EventType::MessageSent, json!({"id": 1}));
    batch.extend(frame(EventType::MessageDeleted, json!({"id": 1})));
    feed.unbounded_send(Ok(batch)).unwrap();
    feed.unbounded_send(Ok(frame(EventType::EventCreated, json!({"id": 2}))))
        .unwrap();
    settle().await;

    assert_eq!(
        observer.event_types(),
        vec![
            EventType::MessageSent,
            EventType::MessageDeleted,
            EventType::EventCreated
        ]
    );
    assert!(manager.snapshot().last_event_timestamp.is_some());
}

#[tokio::test(start_paused = true)]
async fn reassembles_frames_split_across_chunks() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept_next();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());

    manager.connect();
    let bytes = frame(EventType::VehicleStatusChanged, json!({"vehicle": "RTW 1", "status": 3}));
    let (head, tail) = bytes.split_at(bytes.len() / 2);
    feed.unbounded_send(Ok(head.to_vec())).unwrap();
    settle().await;
    assert!(observer.event_types().is_empty());

    feed.unbounded_send(Ok(tail.to_vec())).unwrap();
    settle().await;
    assert_eq!(observer.event_types(), vec![EventType::VehicleStatusChanged]);
}

#[tokio::test(start_paused = true)]
async fn malformed_envelope_is_dropped_and_stream_stays_up() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept_next();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());

    manager.connect();
    feed.unbounded_send(Ok(b"data: not-json\n\n".to_vec())).unwrap();
    feed.unbounded_send(Ok(b"event: heartbeat\n\n".to_vec())).unwrap();
    feed.unbounded_send(Ok(frame(EventType::FlashMessage, json!({"text": "Lagemeldung"}))))
        .unwrap();
    settle().await;

    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert_eq!(observer.event_types(), vec![EventType::FlashMessage]);
    assert_eq!(transport.open_count(), 1);
}

// =============================================================================
// Retry and fallback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fall_back_to_polling_with_capped_delays() {
    let transport = ScriptedTransport::new();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());

    manager.connect();
    tokio::time::sleep(Duration::from_secs(40)).await;

    assert_eq!(manager.status(), ConnectionStatus::Polling);
    assert_eq!(transport.open_count(), 6);
    assert_eq!(
        transport.open_gaps(),
        vec![
            Duration::from_secs(3),
            Duration::from_secs(6),
            Duration::from_secs(9),
            Duration::from_secs(9),
            Duration::from_secs(9),
        ]
    );

    let statuses = observer.statuses();
    let reconnecting = statuses
        .iter()
        .filter(|s| **s == ConnectionStatus::Reconnecting)
        .count();
    assert_eq!(reconnecting, 5);
    assert_eq!(statuses.last(), Some(&ConnectionStatus::Polling));
    assert_eq!(
        &statuses[statuses.len() - 3..],
        &[
            ConnectionStatus::Reconnecting,
            ConnectionStatus::Connecting,
            ConnectionStatus::Polling
        ]
    );
    assert_eq!(observer.error_count(), 0);
    assert_eq!(manager.snapshot().pending_timer, Some(PendingTimer::Polling));
}

#[tokio::test(start_paused = true)]
async fn polling_synthesizes_heartbeats_and_never_reconnects_on_its_own() {
    let transport = ScriptedTransport::new();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(
        config()
            .with_max_reconnect_attempts(0)
            .with_polling_interval(Duration::from_secs(5)),
        transport.clone(),
        observer.clone(),
    );

    transport.script_poll(Err(TransportError::Status(502)));
    manager.connect();
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Polling);

    // First poll fires one full interval after entering polling and fails.
    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(transport.poll_count(), 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.poll_count(), 1);
    assert!(observer.event_types().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.poll_count(), 3);

    let events = observer.events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(event.event_type, EventType::Heartbeat);
        assert_eq!(event.data["source"], "polling");
        assert_eq!(event.data["connectedClients"], 3);
    }

    assert_eq!(transport.open_count(), 1);
    assert_eq!(manager.status(), ConnectionStatus::Polling);
}

#[tokio::test(start_paused = true)]
async fn successful_connect_resets_attempt_counter() {
    let transport = ScriptedTransport::new();
    transport.fail_next(2);
    let _feed = transport.accept_next();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());

    manager.connect();
    tokio::time::sleep(Duration::from_millis(3_001)).await;
    assert_eq!(manager.snapshot().reconnect_attempts, 2);

    tokio::time::sleep(Duration::from_secs(6)).await;
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(snapshot.pending_timer, None);
}

#[tokio::test(start_paused = true)]
async fn server_closing_the_stream_triggers_reconnect() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept_next();
    let _second = transport.accept_next();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());

    manager.connect();
    settle().await;
    drop(feed);
    settle().await;

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::Reconnecting);
    assert_eq!(snapshot.reconnect_attempts, 1);
    assert!(!snapshot.transport_open);
    assert_eq!(snapshot.pending_timer, Some(PendingTimer::Retry));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_without_polling_fails_immediately() {
    let transport = ScriptedTransport::new();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(
        config()
            .with_max_reconnect_attempts(0)
            .with_polling_fallback(false),
        transport.clone(),
        observer.clone(),
    );

    manager.connect();
    settle().await;

    assert_eq!(
        observer.statuses(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Disconnected]
    );
    assert_eq!(observer.error_count(), 1);
    assert_eq!(
        *observer.status_at_error.lock().unwrap(),
        vec![Some(ConnectionStatus::Connecting)]
    );
    assert_eq!(manager.snapshot().pending_timer, None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(observer.error_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn terminal_error_is_recorded_before_disconnected_status_is_visible() {
    let transport = ScriptedTransport::new();
    let dispatcher = EventDispatcher::new_shared();
    let mut status = dispatcher.status();
    let manager = ConnectionManager::new(
        config()
            .with_max_reconnect_attempts(1)
            .with_polling_fallback(false),
        transport.clone(),
        dispatcher.clone(),
    );

    manager.connect();
    loop {
        status.changed().await.unwrap();
        if *status.borrow_and_update() == ConnectionStatus::Disconnected {
            break;
        }
    }

    let error = dispatcher.last_error().expect("error set before disconnected");
    assert!(error.message.contains("after 1 reconnect attempts"));
    assert_eq!(transport.open_count(), 2);
}

// =============================================================================
// Manual control
// =============================================================================

#[tokio::test(start_paused = true)]
async fn reconnect_leaves_polling_and_resets_attempts() {
    let transport = ScriptedTransport::new();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(
        config().with_max_reconnect_attempts(2),
        transport.clone(),
        observer.clone(),
    );

    manager.connect();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(manager.status(), ConnectionStatus::Polling);
    assert_eq!(manager.snapshot().reconnect_attempts, 2);

    let _feed = transport.accept_next();
    let before = observer.statuses().len();
    manager.reconnect();
    settle().await;

    assert_eq!(
        observer.statuses()[before..],
        [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected
        ]
    );
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(snapshot.pending_timer, None);

    // Polling stopped with the reconnect.
    let polls = transport.poll_count();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(transport.poll_count(), polls);
}

#[tokio::test(start_paused = true)]
async fn disconnect_twice_matches_disconnect_once() {
    let transport = ScriptedTransport::new();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());

    manager.connect();
    settle().await;
    assert_eq!(manager.snapshot().pending_timer, Some(PendingTimer::Retry));

    manager.disconnect();
    let once = manager.snapshot();
    manager.disconnect();
    let twice = manager.snapshot();

    assert_eq!(once, twice);
    assert_eq!(twice.status, ConnectionStatus::Disconnected);
    assert_eq!(twice.pending_timer, None);
    assert!(!twice.transport_open);
    let disconnected = observer
        .statuses()
        .iter()
        .filter(|s| **s == ConnectionStatus::Disconnected)
        .count();
    assert_eq!(disconnected, 1);

    // The cancelled retry never fires.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn observer_may_disconnect_from_inside_failure_handling() {
    let transport = ScriptedTransport::new();
    let observer = RecordingObserver::new();
    *observer.disconnect_on.lock().unwrap() = Some(ConnectionStatus::Reconnecting);
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());
    let _ = observer.handle.set(manager.handle());

    manager.connect();
    settle().await;

    assert_eq!(
        observer.statuses(),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Reconnecting,
            ConnectionStatus::Disconnected
        ]
    );
    assert_eq!(manager.snapshot().pending_timer, None);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_connect_cancels_pending_retry() {
    let transport = ScriptedTransport::new();
    transport.fail_next(1);
    let _feed = transport.accept_next();
    let observer = RecordingObserver::new();
    let manager = ConnectionManager::new(config(), transport.clone(), observer.clone());

    manager.connect();
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Reconnecting);

    manager.connect();
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.open_count(), 2);
}
