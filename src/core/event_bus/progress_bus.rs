//! Download progress event bus.
//!
//! Broadcasts download and installation lifecycle events to observers
//! (typically the UI). Delivery is synchronous with the session's state
//! transitions and happens in registration order.

use crate::core::updater::{DownloadSession, DownloadStatus};

use super::core::{EventBusContainer, EventBusStats, SubscriptionId};

/// Snapshot of the download session broadcast on every state change.
#[derive(Clone, Debug)]
pub struct ProgressEvent {
    pub status: DownloadStatus,
    pub progress_percent: u8,
    pub loaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Error message, present only on `Error` events.
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn from_session(session: &DownloadSession) -> Self {
        Self {
            status: session.status,
            progress_percent: session.progress_percent,
            loaded_bytes: session.loaded_bytes,
            total_bytes: session.total_bytes,
            error: None,
        }
    }

    pub fn failure(session: &DownloadSession, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::from_session(session)
        }
    }
}

/// Specialized container for download progress events.
#[derive(Clone, Default)]
pub struct ProgressBusContainer {
    inner: EventBusContainer<ProgressEvent>,
}

impl ProgressBusContainer {
    pub fn new() -> Self {
        Self {
            inner: EventBusContainer::new(),
        }
    }

    /// Subscribe to all progress events.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.inner.subscribe(move |event| {
            callback(event);
            true
        })
    }

    /// Subscribe to terminal events only (completed or error).
    pub fn subscribe_terminal<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.inner.subscribe_with_filter(
            move |event| {
                callback(event);
                true
            },
            |event| {
                matches!(
                    event.status,
                    DownloadStatus::Completed | DownloadStatus::Error
                )
            },
        )
    }

    /// Subscribe to a single event (one-shot).
    pub fn subscribe_once<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnOnce(&ProgressEvent) + Send + Sync + 'static,
    {
        self.inner.subscribe_once(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Publish a progress event to all subscribers.
    pub fn publish(&self, event: ProgressEvent) {
        log::trace!(
            "[ProgressBus] Publishing {:?} at {}%",
            event.status,
            event.progress_percent
        );
        self.inner.publish(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    pub fn stats(&self) -> EventBusStats {
        self.inner.stats()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}
