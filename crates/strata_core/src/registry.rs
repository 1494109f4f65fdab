//! Ordered observation registry
//!
//! A pub/sub ledger of cancellable subscriptions, kept in subscription
//! order. The registry can own a teardown action for whatever external
//! resource it keeps alive (a tick scheduler, a change-detection hook); the
//! action runs exactly once, when cancellation empties the registry.
//!
//! Notification iterates over a snapshot taken when it starts, so a
//! subscriber may cancel itself (or any other subscriber) from inside its
//! own callback. A subscriber cancelled mid-notification is not called
//! afterwards; everyone else still is.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct Entry<T> {
    callback: Callback<T>,
    /// Last value delivered (or seeded) for de-duplication
    last: Option<T>,
}

struct RegistryInner<T> {
    entries: IndexMap<u64, Entry<T>>,
    next_id: u64,
    teardown: Option<Box<dyn FnOnce()>>,
}

/// Removal half of the registry, erased so tokens are not generic
trait Unsubscribe {
    fn unsubscribe(&self, id: u64);
}

impl<T> Unsubscribe for RefCell<RegistryInner<T>> {
    fn unsubscribe(&self, id: u64) {
        let teardown = {
            let mut inner = self.borrow_mut();
            if inner.entries.shift_remove(&id).is_none() {
                return;
            }
            if inner.entries.is_empty() {
                inner.teardown.take()
            } else {
                None
            }
        };

        if let Some(teardown) = teardown {
            tracing::trace!("observation registry emptied, tearing down");
            teardown();
        }
    }
}

/// Ordered map of cancellable subscriptions
pub struct ObservationRegistry<T> {
    inner: Rc<RefCell<RegistryInner<T>>>,
}

impl<T> Clone for ObservationRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> ObservationRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                entries: IndexMap::new(),
                next_id: 0,
                teardown: None,
            })),
        }
    }

    /// Set the action run when the last subscription is cancelled
    ///
    /// Replaces any previously installed action that has not run yet.
    pub fn set_teardown<F>(&self, teardown: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.borrow_mut().teardown = Some(Box::new(teardown));
    }

    /// Subscribe without a seed value
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        self.insert(None, callback)
    }

    /// Subscribe and record `initial` as already delivered
    ///
    /// The seed does not fire the callback; it only makes a later
    /// `notify_distinct` with an equal value a no-op for this subscriber.
    pub fn subscribe_seeded<F>(&self, initial: T, callback: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        self.insert(Some(initial), callback)
    }

    fn insert<F>(&self, last: Option<T>, callback: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.insert(
                id,
                Entry {
                    callback: Rc::new(RefCell::new(callback)),
                    last,
                },
            );
            id
        };

        let weak = Rc::downgrade(&self.inner);
        let registry: Weak<dyn Unsubscribe> = weak;
        Subscription {
            id,
            registry: Cell::new(Some(registry)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Deliver `value` to every subscriber, in subscription order
    pub fn notify(&self, value: &T)
    where
        T: Clone,
    {
        self.deliver(value);
    }

    /// Deliver `value` only to subscribers whose last value differs from it
    ///
    /// Returns the number of callbacks fired.
    pub fn notify_distinct(&self, value: &T) -> usize
    where
        T: Clone + PartialEq,
    {
        self.deliver_distinct(value)
    }

    fn snapshot(&self) -> Vec<(u64, Callback<T>)> {
        self.inner
            .borrow()
            .entries
            .iter()
            .map(|(id, entry)| (*id, Rc::clone(&entry.callback)))
            .collect()
    }

    fn deliver(&self, value: &T) -> usize
    where
        T: Clone,
    {
        let mut fired = 0;
        for (id, callback) in self.snapshot() {
            {
                let mut inner = self.inner.borrow_mut();
                match inner.entries.get_mut(&id) {
                    Some(entry) => entry.last = Some(value.clone()),
                    None => continue,
                }
            }
            if invoke(&callback, value) {
                fired += 1;
            }
        }
        fired
    }

    fn deliver_distinct(&self, value: &T) -> usize
    where
        T: Clone + PartialEq,
    {
        let mut fired = 0;
        for (id, callback) in self.snapshot() {
            {
                let mut inner = self.inner.borrow_mut();
                let Some(entry) = inner.entries.get_mut(&id) else {
                    continue;
                };
                if entry.last.as_ref() == Some(value) {
                    continue;
                }
                entry.last = Some(value.clone());
            }
            if invoke(&callback, value) {
                fired += 1;
            }
        }
        fired
    }
}

impl<T: 'static> Default for ObservationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObservationRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationRegistry")
            .field("subscribers", &self.inner.borrow().entries.len())
            .finish()
    }
}

fn invoke<T>(callback: &Callback<T>, value: &T) -> bool {
    match callback.try_borrow_mut() {
        Ok(mut callback) => {
            (&mut *callback)(value);
            true
        }
        Err(_) => {
            tracing::warn!("re-entrant notification skipped for a subscriber already running");
            false
        }
    }
}

/// Token for one subscription
///
/// Cancelling is idempotent. Dropping the token cancels it.
pub struct Subscription {
    id: u64,
    registry: Cell<Option<Weak<dyn Unsubscribe>>>,
}

impl Subscription {
    /// Remove this subscription from its registry
    pub fn cancel(&self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.unsubscribe(self.id);
        }
    }

    /// Whether the subscription is still registered
    pub fn is_active(&self) -> bool {
        let registry = self.registry.take();
        let alive = registry
            .as_ref()
            .map(|weak| weak.strong_count() > 0)
            .unwrap_or(false);
        self.registry.set(registry);
        alive
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
