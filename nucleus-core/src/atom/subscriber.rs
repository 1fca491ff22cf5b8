//! Subscriber registry.
//!
//! Each atom keeps two lists: value subscribers and error subscribers. Both
//! are ordered by registration, and notification walks them in that order.
//!
//! # Notification rules
//!
//! - The list is snapshotted before delivery and no lock is held while a
//!   callback runs, so callbacks may freely read, write or subscribe.
//! - A callback removed by an earlier callback in the same pass is skipped.
//! - A panicking callback is logged and the pass continues with the next one.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{error, trace};

use super::id::{AtomId, SubscriberId};
use crate::error::panic_message;

/// Callback stored on a subscriber list.
pub(crate) type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of callbacks keyed by registration.
pub(crate) struct SubscriberList<T: ?Sized> {
    entries: RwLock<IndexMap<SubscriberId, Callback<T>>>,
}

impl<T: ?Sized> SubscriberList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    pub(crate) fn insert(&self, callback: Callback<T>) -> SubscriberId {
        let id = SubscriberId::next();
        self.entries.write().insert(id, callback);
        id
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        // shift_remove keeps the remaining entries in registration order
        self.entries.write().shift_remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Deliver `value` to every registered callback.
    ///
    /// Returns the number of callbacks that ran to completion.
    pub(crate) fn notify(&self, atom: AtomId, value: &T) -> usize {
        let snapshot: Vec<(SubscriberId, Callback<T>)> = self
            .entries
            .read()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        trace!(%atom, subscribers = snapshot.len(), "notifying subscribers");

        let mut delivered = 0;
        for (id, callback) in snapshot {
            if !self.entries.read().contains_key(&id) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        %atom,
                        subscriber = %id,
                        panic = %panic_message(&*payload),
                        "subscriber panicked during notification"
                    );
                }
            }
        }
        delivered
    }
}

/// Capability returned by `subscribe` that removes exactly one registration.
///
/// Dropping an `Unsubscribe` does **not** remove the subscription; teardown
/// is explicit. Call [`unsubscribe`](Self::unsubscribe) to stop receiving
/// notifications, or [`detach`](Self::detach) to keep the subscription for
/// the rest of the atom's life.
#[must_use = "dropping an Unsubscribe keeps the subscription alive; call `unsubscribe()` or `detach()`"]
pub struct Unsubscribe {
    remove: Box<dyn FnOnce() + Send + Sync>,
}

impl Unsubscribe {
    pub(crate) fn new<F>(remove: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            remove: Box::new(remove),
        }
    }

    /// Combine several capabilities into one that removes all of them.
    pub fn merge(handles: impl IntoIterator<Item = Unsubscribe>) -> Self {
        let handles: Vec<Unsubscribe> = handles.into_iter().collect();
        Self::new(move || {
            for handle in handles {
                handle.unsubscribe();
            }
        })
    }

    /// Remove the subscription.
    pub fn unsubscribe(self) {
        (self.remove)();
    }

    /// Keep the subscription for as long as the atom lives.
    pub fn detach(self) {}
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe").finish_non_exhaustive()
    }
}

/// Unsubscribes everything it holds when dropped.
///
/// Used where a subscription must not outlive a scope, such as a pending
/// `next()` future that gets cancelled or a mounted host hook.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionGuard {
    handles: Vec<Unsubscribe>,
}

impl SubscriptionGuard {
    pub(crate) fn push(&mut self, handle: Unsubscribe) {
        self.handles.push(handle);
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.unsubscribe();
        }
    }
}
