//! Callback sets with idempotent unsubscribe and isolated fan-out.
//!
//! Used by the [`EventBus`](crate::bus::EventBus) for its broadcast
//! subscribers and by the [`DebugClient`](crate::client::DebugClient) for
//! its event listeners. A callback that panics is logged and skipped; the
//! remaining callbacks still run.

use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::warn;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entries<T: ?Sized> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// An ordered set of subscriber callbacks receiving `&T`.
pub struct SubscriberSet<T: ?Sized> {
    entries: Arc<Mutex<Entries<T>>>,
}

impl<T: ?Sized + 'static> SubscriberSet<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Register a callback; the returned [`Subscription`] removes it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut entries = self.entries.lock();
            let id = entries.next_id;
            entries.next_id += 1;
            entries.callbacks.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Entries<T>>> = Arc::downgrade(&self.entries);
        Subscription {
            remove: Arc::new(move || {
                if let Some(entries) = weak.upgrade() {
                    entries.lock().callbacks.retain(|(cid, _)| *cid != id);
                }
            }),
        }
    }

    /// Invoke every callback with `item`, in subscription order.
    ///
    /// Callbacks run outside the internal lock, so a callback may subscribe
    /// or unsubscribe without deadlocking. Returns how many callbacks
    /// completed without panicking.
    pub fn notify(&self, item: &T) -> usize {
        let callbacks: Vec<Callback<T>> = self
            .entries
            .lock()
            .callbacks
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        let mut delivered = 0;
        for cb in callbacks {
            match catch_unwind(AssertUnwindSafe(|| cb(item))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("subscriber panicked; continuing with remaining subscribers"),
            }
        }
        delivered
    }

    /// Remove every callback.
    pub fn clear(&self) {
        self.entries.lock().callbacks.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized + 'static> Default for SubscriberSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for SubscriberSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("len", &self.entries.lock().callbacks.len())
            .finish()
    }
}

/// Handle returned by [`SubscriberSet::subscribe`].
///
/// [`unsubscribe`](Subscription::unsubscribe) may be called any number of
/// times. Dropping the handle leaves the callback registered.
#[derive(Clone)]
pub struct Subscription {
    remove: Arc<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// Remove the callback from its set. Idempotent.
    pub fn unsubscribe(&self) {
        (self.remove)();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_in_subscription_order() {
        let set: SubscriberSet<u32> = SubscriberSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let seen = seen.clone();
            set.subscribe(move |v: &u32| seen.lock().push(format!("{}{}", tag, v)));
        }
        assert_eq!(set.notify(&7), 2);
        assert_eq!(*seen.lock(), vec!["a7", "b7"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let set: SubscriberSet<u32> = SubscriberSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = set.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let other = set.subscribe(|_| {});
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(set.len(), 1);
        set.notify(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        other.unsubscribe();
        assert!(set.is_empty());
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_fanout() {
        let set: SubscriberSet<u32> = SubscriberSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        set.subscribe(|_| panic!("bad observer"));
        let h = hits.clone();
        set.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(set.notify(&1), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_after_set_dropped() {
        let set: SubscriberSet<u32> = SubscriberSet::new();
        let sub = set.subscribe(|_| {});
        drop(set);
        sub.unsubscribe();
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let set: SubscriberSet<u32> = SubscriberSet::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let s = slot.clone();
        let sub = set.subscribe(move |_| {
            if let Some(sub) = s.lock().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);
        set.notify(&1);
        assert!(set.is_empty());
    }
}
