//! Change notification.
//!
//! Subscribers register for one exact key path, or for the root path to hear
//! every change. Delivery is synchronous on the publishing thread, in
//! registration order. A subscriber that returns an error or panics is
//! logged and skipped; the remaining subscribers still run and the publisher
//! never sees the failure.

use crate::tree::KeyPath;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Kind of change carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
    /// The whole document was replaced
    Reload,
}

/// A single logical mutation of the merged document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Changed path; the root for `Reload`
    pub key: KeyPath,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Builds an `Add` or `Modify` event depending on whether an old value existed.
    pub fn write(key: KeyPath, old_value: Option<Value>, new_value: Value) -> Self {
        let kind = if old_value.is_some() {
            ChangeKind::Modify
        } else {
            ChangeKind::Add
        };
        Self {
            key,
            new_value: Some(new_value),
            old_value,
            kind,
        }
    }

    pub fn delete(key: KeyPath, old_value: Value) -> Self {
        Self {
            key,
            new_value: None,
            old_value: Some(old_value),
            kind: ChangeKind::Delete,
        }
    }

    /// A whole-document replacement.
    pub fn reload(old_document: Value, new_document: Value) -> Self {
        Self {
            key: KeyPath::root(),
            new_value: Some(new_document),
            old_value: Some(old_document),
            kind: ChangeKind::Reload,
        }
    }
}

/// Handle returned by [`ChangeNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Error type subscribers may return.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// A change subscriber.
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) -> Result<(), CallbackError> + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    key: KeyPath,
    callback: ChangeCallback,
}

/// Registry of change subscribers.
#[derive(Default)]
pub struct ChangeNotifier {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for changes at exactly `key`, or for all changes when `key` is the root.
    pub fn subscribe<F>(&self, key: KeyPath, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().push(Subscription {
            id,
            key,
            callback: Arc::new(callback),
        });
        id
    }

    /// Removes a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Delivers `event` to matching subscribers. Returns how many succeeded.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        // Snapshot so callbacks may subscribe or unsubscribe without deadlocking.
        let targets: Vec<(SubscriptionId, ChangeCallback)> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.key.is_root() || s.key == event.key)
            .map(|s| (s.id, Arc::clone(&s.callback)))
            .collect();

        let mut delivered = 0;
        for (id, callback) in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(key = %event.key, subscription = id.0, error = %e, "Change callback failed");
                }
                Err(_) => {
                    warn!(key = %event.key, subscription = id.0, "Change callback panicked");
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
