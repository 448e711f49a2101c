//! Generic event bus.
//!
//! Direct-call multicast with subscription lifecycle management:
//! publish is synchronous, listeners run in registration order, and a
//! panicking listener never prevents delivery to the listeners after it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Identifier returned by subscribe calls, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Counters exposed for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventBusStats {
    pub events_published: u64,
    pub total_deliveries: u64,
    pub active_subscriptions: usize,
}

type Callback<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type Filter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

struct Subscription<E> {
    id: SubscriptionId,
    callback: Callback<E>,
    filter: Option<Filter<E>>,
}

/// Shareable event bus over events of type `E`.
///
/// Cloning shares the subscriber list, so any clone can publish to
/// subscribers registered through any other clone.
pub struct EventBusContainer<E> {
    subscriptions: Arc<Mutex<Vec<Subscription<E>>>>,
    next_id: Arc<AtomicU64>,
    events_published: Arc<AtomicU64>,
    total_deliveries: Arc<AtomicU64>,
}

impl<E> Clone for EventBusContainer<E> {
    fn clone(&self) -> Self {
        Self {
            subscriptions: self.subscriptions.clone(),
            next_id: self.next_id.clone(),
            events_published: self.events_published.clone(),
            total_deliveries: self.total_deliveries.clone(),
        }
    }
}

impl<E> EventBusContainer<E> {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            events_published: Arc::new(AtomicU64::new(0)),
            total_deliveries: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to all events. The callback returns `true` to keep the
    /// subscription active, `false` to unsubscribe itself (one-shot
    /// behavior).
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.register(Arc::new(callback), None)
    }

    /// Subscribe with a filter; the callback only sees events for which
    /// `filter` returns `true`.
    pub fn subscribe_with_filter<F, P>(&self, callback: F, filter: P) -> SubscriptionId
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.register(Arc::new(callback), Some(Arc::new(filter)))
    }

    /// Subscribe to a single event; the subscription is removed after the
    /// first delivery.
    pub fn subscribe_once<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnOnce(&E) + Send + Sync + 'static,
    {
        let slot = Mutex::new(Some(callback));
        self.subscribe(move |event| {
            if let Some(callback) = slot.lock().unwrap().take() {
                callback(event);
            }
            false
        })
    }

    fn register(&self, callback: Callback<E>, filter: Option<Filter<E>>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().unwrap().push(Subscription {
            id,
            callback,
            filter,
        });
        id
    }

    /// Remove a subscription. Returns `false` if the id was not active.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Deliver `event` to every matching subscriber, in registration
    /// order. Each invocation is isolated: a panicking listener is
    /// dropped and delivery continues with the next one.
    ///
    /// Callbacks run with the subscriber list unlocked, so a listener may
    /// call `subscribe`, `unsubscribe`, or `publish` on this bus from
    /// inside its callback. Subscriptions added or removed mid-delivery
    /// take effect from the next publish.
    pub fn publish(&self, event: E) {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let snapshot: Vec<(SubscriptionId, Callback<E>, Option<Filter<E>>)> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|s| (s.id, s.callback.clone(), s.filter.clone()))
            .collect();

        let mut delivered = 0u64;
        let mut removed = Vec::new();

        for (id, callback, filter) in snapshot {
            if let Some(filter) = filter {
                if !filter(&event) {
                    continue;
                }
            }

            delivered += 1;
            match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(true) => {}
                Ok(false) => removed.push(id),
                Err(_) => {
                    log::error!("Event listener {id:?} panicked during delivery, removing it");
                    removed.push(id);
                }
            }
        }

        self.total_deliveries.fetch_add(delivered, Ordering::Relaxed);

        if !removed.is_empty() {
            self.subscriptions
                .lock()
                .unwrap()
                .retain(|s| !removed.contains(&s.id));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            events_published: self.events_published.load(Ordering::Relaxed),
            total_deliveries: self.total_deliveries.load(Ordering::Relaxed),
            active_subscriptions: self.subscriber_count(),
        }
    }

    /// Remove all subscriptions.
    pub fn clear(&self) {
        self.subscriptions.lock().unwrap().clear();
    }
}

impl<E> Default for EventBusContainer<E> {
    fn default() -> Self {
        Self::new()
    }
}
