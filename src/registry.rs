//! Subscription registry: routes dispatched events to callbacks by type,
//! including a wildcard bucket, with safe concurrent add/remove.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, Weak};

use crate::event::Event;

/// A subscriber callback. Invoked synchronously on the dispatching task;
/// a callback that blocks stalls the read loop (caller responsibility).
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone)]
enum BucketKey {
    Wildcard,
    Named(String),
}

/// An opaque removal token returned by a `subscribe*` call.
///
/// Removal is idempotent and safe to call from inside the very callback it
/// identifies: the registry snapshots its bucket before invoking callbacks,
/// so a removal becomes visible starting with the *next* dispatch, never the
/// one currently in flight.
#[derive(Clone)]
pub struct Subscription {
    registry: Weak<Registry>,
    key: BucketKey,
    id: u64,
}

impl Subscription {
    /// Removes this subscription. A no-op if already removed, or if the
    /// owning registry has already been dropped.
    pub fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.key, self.id);
        }
    }
}

#[derive(Default)]
struct Inner {
    wildcard: Vec<(u64, Callback)>,
    buckets: HashMap<String, Vec<(u64, Callback)>>,
    next_id: u64,
}

/// The per-connection subscription table.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    /// Creates an empty, shareable registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribes to every event regardless of type.
    pub fn subscribe_all(self: &Arc<Self>, callback: Callback) -> Subscription {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.wildcard.push((id, callback));
        Subscription { registry: Arc::downgrade(self), key: BucketKey::Wildcard, id }
    }

    /// Subscribes to events whose `event_type` equals `type_key` (the empty
    /// string is the "messages"/unnamed bucket).
    pub fn subscribe(self: &Arc<Self>, type_key: impl Into<String>, callback: Callback) -> Subscription {
        let type_key = type_key.into();
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.buckets.entry(type_key.clone()).or_default().push((id, callback));
        Subscription { registry: Arc::downgrade(self), key: BucketKey::Named(type_key), id }
    }

    fn remove(&self, key: &BucketKey, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        match key {
            BucketKey::Wildcard => inner.wildcard.retain(|(sid, _)| *sid != id),
            BucketKey::Named(name) => {
                if let Some(bucket) = inner.buckets.get_mut(name) {
                    bucket.retain(|(sid, _)| *sid != id);
                }
            }
        }
    }

    /// Dispatches `event` to matching callbacks: wildcard subscribers first
    /// (in registration order), then type-keyed subscribers (in registration
    /// order). A callback that panics is isolated and logged; it never
    /// prevents later callbacks from running or corrupts registry state.
    pub fn dispatch(&self, event: &Event) {
        let (wildcard, named) = {
            let inner = self.inner.lock().unwrap();
            let wildcard = inner.wildcard.clone();
            let named = inner.buckets.get(&event.event_type).cloned().unwrap_or_default();
            (wildcard, named)
        };
        for (_, callback) in wildcard.iter().chain(named.iter()) {
            Self::invoke(callback, event);
        }
    }

    fn invoke(callback: &Callback, event: &Event) {
        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            tracing::error!(event_type = %event.event_type, "subscriber callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(event_type: &str, data: &str) -> Event {
        Event { event_type: event_type.to_string(), data: data.to_string(), last_event_id: String::new() }
    }

    #[test]
    fn wildcard_receives_every_event_before_type_keyed() {
        let registry = Registry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_a = order.clone();
        let order_b = order.clone();
        registry.subscribe("test", Arc::new(move |_: &Event| order_a.lock().unwrap().push("typed")));
        registry.subscribe_all(Arc::new(move |_: &Event| order_b.lock().unwrap().push("wildcard")));
        registry.dispatch(&event("test", "x"));
        assert_eq!(*order.lock().unwrap(), vec!["wildcard", "typed"]);
    }

    #[test]
    fn messages_bucket_only_matches_empty_type() {
        let registry = Registry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        registry.subscribe("", Arc::new(move |_: &Event| { count_clone.fetch_add(1, Ordering::SeqCst); }));
        registry.dispatch(&event("", "a"));
        registry.dispatch(&event("named", "b"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removal_is_idempotent_and_affects_only_future_dispatches() {
        let registry = Registry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let sub = registry.subscribe_all(Arc::new(move |_: &Event| { count_clone.fetch_add(1, Ordering::SeqCst); }));
        registry.dispatch(&event("a", "1"));
        sub.remove();
        sub.remove();
        registry.dispatch(&event("a", "2"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_can_remove_its_own_subscription() {
        let registry = Registry::new();
        let removed = Arc::new(Mutex::new(None));
        let removed_clone = removed.clone();
        let sub = registry.subscribe_all(Arc::new(move |_: &Event| {
            if let Some(handle) = removed_clone.lock().unwrap().take() {
                let handle: Subscription = handle;
                handle.remove();
            }
        }));
        *removed.lock().unwrap() = Some(sub.clone());
        registry.dispatch(&event("a", "1"));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        registry.subscribe_all(Arc::new(move |_: &Event| { count_clone.fetch_add(1, Ordering::SeqCst); }));
        registry.dispatch(&event("a", "2"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_does_not_block_later_callbacks() {
        let registry = Registry::new();
        registry.subscribe_all(Arc::new(|_: &Event| panic!("boom")));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        registry.subscribe_all(Arc::new(move |_: &Event| { count_clone.fetch_add(1, Ordering::SeqCst); }));
        registry.dispatch(&event("a", "1"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
