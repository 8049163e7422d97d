//! Owned publish/subscribe registry for change notifications.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Callback invoked on every change notification.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`SubscriberRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Set of change subscribers.
///
/// Cloning yields another handle to the same set. Callbacks run on the
/// watcher's delivery task and must not block; enqueue work instead.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<DashMap<SubscriptionHandle, ChangeCallback>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for future notifications.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(Uuid::new_v4());
        self.subscribers.insert(handle, Arc::new(callback));
        handle
    }

    /// Register a channel receiver for future notifications.
    ///
    /// Notifications are sent with `try_send`; when the receiver lags and the
    /// channel is full, further notifications are dropped until it catches up.
    /// Dropping the receiver ends the subscription at the next notification.
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionHandle, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = SubscriptionHandle(Uuid::new_v4());
        let subscribers: Weak<DashMap<SubscriptionHandle, ChangeCallback>> =
            Arc::downgrade(&self.subscribers);

        let callback: ChangeCallback = Arc::new(move || {
            if let Err(TrySendError::Closed(())) = tx.try_send(()) {
                if let Some(subscribers) = subscribers.upgrade() {
                    subscribers.remove(&handle);
                    debug!("Removed subscription {} with dropped receiver", handle);
                }
            }
        });
        self.subscribers.insert(handle, callback);
        (handle, rx)
    }

    /// Remove a subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers.remove(&handle).is_some()
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Invoke every current subscriber once. Returns how many were called.
    pub fn notify_all(&self) -> usize {
        // Snapshot first so callbacks may (un)subscribe without deadlocking.
        let callbacks: Vec<(SubscriptionHandle, ChangeCallback)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        for (handle, callback) in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                warn!("Change subscriber {} panicked", handle);
            }
        }

        callbacks.len()
    }
}
