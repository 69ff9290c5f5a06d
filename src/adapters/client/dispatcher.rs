//! Type-routed subscriber callbacks on top of a Connection Manager.
//!
//! Dashboards and stores subscribe to the envelope types they render; the
//! dispatcher is installed as the manager's single observer and fans each
//! envelope out to matching subscribers. Connection status is published on
//! a `tokio::sync::watch` channel for UI indicators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;

use crate::domain::events::{Envelope, EventType};
use crate::domain::foundation::ConnectionStatus;
use crate::ports::{ConnectionError, ConnectionObserver};

/// Callback invoked with each matching envelope.
pub type EnvelopeHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: Option<EventType>,
    handler: EnvelopeHandler,
}

/// [`ConnectionObserver`] that routes envelopes to per-type subscribers.
pub struct EventDispatcher {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    status_tx: watch::Sender<ConnectionStatus>,
    last_error: Mutex<Option<ConnectionError>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            status_tx,
            last_error: Mutex::new(None),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Subscribes to one envelope type.
    pub fn subscribe<F>(&self, event_type: EventType, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.add(Some(event_type), Arc::new(handler))
    }

    /// Subscribes to every envelope, including heartbeats.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(handler))
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Receiver that always holds the latest connection status.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn current_status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// The terminal error, if recovery has been exhausted.
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn add(&self, filter: Option<EventType>, handler: EnvelopeHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                id,
                filter,
                handler,
            });
        id
    }

    fn handlers_for(&self, event_type: EventType) -> Vec<EnvelopeHandler> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|subscription| subscription.filter.map_or(true, |f| f == event_type))
            .map(|subscription| Arc::clone(&subscription.handler))
            .collect()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionObserver for EventDispatcher {
    fn on_event(&self, envelope: Envelope) {
        // Clone handlers out so a handler may (un)subscribe without deadlocking.
        let handlers = self.handlers_for(envelope.event_type);
        if handlers.is_empty() {
            tracing::trace!(event_type = %envelope.event_type, "No subscribers for envelope");
            return;
        }
        for handler in handlers {
            handler(&envelope);
        }
    }

    fn on_status_change(&self, status: ConnectionStatus) {
        if status == ConnectionStatus::Connected {
            *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        self.status_tx.send_replace(status);
    }

    fn on_error(&self, error: &ConnectionError) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
    }
}

/// Groups subscriptions so they are released together.
///
/// A view that subscribes to several types holds one of these and drops it
/// when torn down.
pub struct SubscriptionSet {
    dispatcher: Arc<EventDispatcher>,
    ids: Vec<SubscriptionId>,
}

impl SubscriptionSet {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            dispatcher,
            ids: Vec::new(),
        }
    }

    pub fn on<F>(&mut self, event_type: EventType, handler: F) -> &mut Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.ids.push(self.dispatcher.subscribe(event_type, handler));
        self
    }

    pub fn on_any<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.ids.push(self.dispatcher.subscribe_all(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.dispatcher.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use serde_json::json;

    fn envelope(event_type: EventType) -> Envelope {
        Envelope::new(event_type, json!({"id": 7}), Timestamp::now())
    }

    fn counter() -> (Arc<Mutex<Vec<EventType>>>, impl Fn(&Envelope) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |e: &Envelope| sink.lock().unwrap().push(e.event_type))
    }

    #[test]
    fn routes_only_matching_types() {
        let dispatcher = EventDispatcher::new();
        let (seen, handler) = counter();
        dispatcher.subscribe(EventType::VehicleStatusChanged, handler);

        dispatcher.on_event(envelope(EventType::VehicleStatusChanged));
        dispatcher.on_event(envelope(EventType::FlashMessage));

        assert_eq!(*seen.lock().unwrap(), vec![EventType::VehicleStatusChanged]);
    }

    #[test]
    fn wildcard_subscribers_see_everything() {
        let dispatcher = EventDispatcher::new();
        let (seen, handler) = counter();
        dispatcher.subscribe_all(handler);

        dispatcher.on_event(envelope(EventType::Heartbeat));
        dispatcher.on_event(envelope(EventType::EventCreated));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventType::Heartbeat, EventType::EventCreated]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let (seen, handler) = counter();
        let id = dispatcher.subscribe(EventType::MessageSent, handler);

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.on_event(envelope(EventType::MessageSent));

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let inner = dispatcher.clone();
        let own_id = slot.clone();
        let id = dispatcher.subscribe(EventType::FlashMessage, move |_| {
            if let Some(id) = *own_id.lock().unwrap() {
                inner.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        dispatcher.on_event(envelope(EventType::FlashMessage));
        assert_eq!(dispatcher.subscription_count(), 0);
    }

    #[test]
    fn status_is_published_on_watch_channel() {
        let dispatcher = EventDispatcher::new();
        let rx = dispatcher.status();

        dispatcher.on_status_change(ConnectionStatus::Reconnecting);

        assert_eq!(*rx.borrow(), ConnectionStatus::Reconnecting);
        assert_eq!(dispatcher.current_status(), ConnectionStatus::Reconnecting);
    }

    #[test]
    fn last_error_cleared_on_connect() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_error(&ConnectionError::new("gone"));
        assert_eq!(dispatcher.last_error().unwrap().message, "gone");

        dispatcher.on_status_change(ConnectionStatus::Connected);
        assert!(dispatcher.last_error().is_none());
    }

    #[test]
    fn subscription_set_releases_on_drop() {
        let dispatcher = EventDispatcher::new_shared();
        {
            let mut set = SubscriptionSet::new(dispatcher.clone());
            set.on(EventType::EventCreated, |_| {})
                .on(EventType::EventUpdated, |_| {})
                .on_any(|_| {});
            assert_eq!(set.len(), 3);
            assert_eq!(dispatcher.subscription_count(), 3);
        }
        assert_eq!(dispatcher.subscription_count(), 0);
    }
}
