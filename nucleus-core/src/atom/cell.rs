//! Atom Implementation
//!
//! An [`Atom`] is the only reactive primitive in the store. It holds a value,
//! an ordered list of subscribers and, for derived atoms, the derivation that
//! recomputes the value from other atoms.
//!
//! # How Atoms Work
//!
//! 1. A primitive atom is created with a value and changes only through
//!    [`Atom::set`]. Every write notifies every subscriber, even when the new
//!    value equals the old one.
//!
//! 2. A derived atom starts in the [`AtomState::Pending`] placeholder and
//!    immediately schedules its first derivation on the tokio runtime.
//!
//! 3. While deriving, each [`Getter::get`] call subscribes the derived atom
//!    to the atom being read. When that dependency later commits a value that
//!    differs from the one last observed, the derived atom recomputes.
//!
//! 4. Subscribers run synchronously, in registration order, after the value
//!    has been committed.
//!
//! # Handles
//!
//! `Atom<V>` is a shared handle. Cloning it gives another handle to the same
//! atom; use [`clone_atom`] for an independent copy.

use std::borrow::Cow;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;

use super::derive::Derivation;
use super::getter::Getter;
use super::id::AtomId;
use super::state::{AtomKind, AtomState};
use super::subscriber::{SubscriberList, SubscriptionGuard, Unsubscribe};
use crate::config::AtomConfig;
use crate::error::{AtomError, Result};

/// Shared state behind every handle to one atom.
pub(crate) struct AtomInner<V> {
    pub(crate) id: AtomId,
    pub(crate) label: Option<Cow<'static, str>>,
    pub(crate) state: RwLock<AtomState<V>>,
    pub(crate) subscribers: SubscriberList<V>,
    pub(crate) error_subscribers: SubscriberList<AtomError>,
    pub(crate) derivation: Option<Derivation<V>>,
}

impl<V> AtomInner<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Write path: commit `value` and notify.
    fn write(&self, value: V) {
        {
            let mut state = self.state.write();
            if let Some(derivation) = &self.derivation {
                derivation.supersede();
            }
            *state = AtomState::Ready(value.clone());
        }
        self.subscribers.notify(self.id, &value);
    }
}

/// A unit of observable, mutable state.
///
/// # Type Parameters
///
/// - `V`: The value type. Must be Clone + Send + Sync so reads can hand out
///   copies and derivations can run on the runtime.
///
/// # Example
///
/// ```rust,ignore
/// let count = Atom::new(0);
/// let doubled = Atom::computed(move |get| Ok(get.get(&count)? * 2))?;
///
/// let unsubscribe = doubled.subscribe(|value| println!("doubled: {value}"));
/// count.set(5); // doubled recomputes and prints "doubled: 10"
/// unsubscribe.unsubscribe();
/// ```
pub struct Atom<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<AtomInner<V>>,
}

impl<V> Atom<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a primitive atom holding `value`.
    pub fn new(value: V) -> Self {
        Self::new_with(AtomConfig::default(), value)
    }

    /// Create a primitive atom with explicit configuration.
    pub fn new_with(mut config: AtomConfig, value: V) -> Self {
        Self::from_parts(config.take_label(), AtomState::Ready(value), None)
    }

    /// Create a derived atom from an asynchronous derivation.
    ///
    /// The atom starts in the placeholder state and its first derivation is
    /// spawned right away. Fails with [`AtomError::NoRuntime`] when there is
    /// no tokio runtime to spawn on.
    pub fn derived<F, Fut>(compute: F) -> Result<Self>
    where
        F: Fn(Getter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self::derived_with(AtomConfig::default(), compute)
    }

    /// Create a derived atom from an asynchronous derivation with explicit
    /// configuration.
    pub fn derived_with<F, Fut>(mut config: AtomConfig, compute: F) -> Result<Self>
    where
        F: Fn(Getter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let runtime = config.resolve_runtime()?;
        let derivation = Derivation::new(runtime, move |getter| compute(getter).boxed());
        let atom = Self::from_parts(config.take_label(), AtomState::Pending, Some(derivation));
        atom.inner.recompute();
        Ok(atom)
    }

    /// Create a derived atom from a synchronous derivation.
    ///
    /// The derivation still runs on the scheduled path, so the atom is
    /// pending until the runtime gets to it.
    pub fn computed<F>(compute: F) -> Result<Self>
    where
        F: Fn(&Getter) -> Result<V> + Send + Sync + 'static,
    {
        Self::computed_with(AtomConfig::default(), compute)
    }

    /// Create a derived atom from a synchronous derivation with explicit
    /// configuration.
    pub fn computed_with<F>(config: AtomConfig, compute: F) -> Result<Self>
    where
        F: Fn(&Getter) -> Result<V> + Send + Sync + 'static,
    {
        let compute = Arc::new(compute);
        Self::derived_with(config, move |getter| {
            let compute = Arc::clone(&compute);
            async move { compute(&getter) }
        })
    }

    fn from_parts(
        label: Option<Cow<'static, str>>,
        state: AtomState<V>,
        derivation: Option<Derivation<V>>,
    ) -> Self {
        Self {
            inner: Arc::new(AtomInner {
                id: AtomId::next(),
                label,
                state: RwLock::new(state),
                subscribers: SubscriberList::new(),
                error_subscribers: SubscriberList::new(),
                derivation,
            }),
        }
    }

    /// Get the atom's unique ID.
    pub fn id(&self) -> AtomId {
        self.inner.id
    }

    /// Get the configured label, if any.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    pub fn kind(&self) -> AtomKind {
        if self.inner.derivation.is_some() {
            AtomKind::Derived
        } else {
            AtomKind::Primitive
        }
    }

    /// Get the current value.
    ///
    /// Returns `None` while the atom holds the placeholder or its last
    /// derivation failed; [`state`](Self::state) tells the two apart.
    pub fn get(&self) -> Option<V> {
        self.inner.state.read().value().cloned()
    }

    /// Get a copy of the full state.
    pub fn state(&self) -> AtomState<V> {
        self.inner.state.read().clone()
    }

    /// Whether the atom currently holds the placeholder.
    pub fn is_pending(&self) -> bool {
        self.inner.state.read().is_pending()
    }

    /// Set a new value and notify subscribers.
    ///
    /// On a derived atom the written value stands until the next dependency
    /// change, and any derivation still in flight is discarded when it
    /// finishes.
    pub fn set(&self, value: V) {
        self.inner.write(value);
    }

    /// Update the value using a function of the current one.
    ///
    /// Fails without writing when there is no current value.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&V) -> V,
    {
        let current = match self.state() {
            AtomState::Ready(value) => value,
            AtomState::Pending => return Err(AtomError::Pending(self.id())),
            AtomState::Failed(err) => return Err(err),
        };
        self.set(f(&current));
        Ok(())
    }

    /// Register a callback invoked with every newly committed value.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.insert(Arc::new(callback));
        let inner = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.subscribers.remove(id);
            }
        })
    }

    /// Register a callback invoked whenever a derivation of this atom fails.
    pub fn on_error<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&AtomError) + Send + Sync + 'static,
    {
        let id = self.inner.error_subscribers.insert(Arc::new(callback));
        let inner = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.error_subscribers.remove(id);
            }
        })
    }

    /// Wait for the next committed value or failure.
    pub async fn next(&self) -> Result<V> {
        self.wait(false).await
    }

    /// Get the current value, waiting for one if the atom is pending.
    ///
    /// Resolves with the stored failure if the last derivation failed.
    pub async fn ready(&self) -> Result<V> {
        self.wait(true).await
    }

    async fn wait(&self, accept_current: bool) -> Result<V> {
        let (sender, receiver) = oneshot::channel::<Result<V>>();
        let sender = Arc::new(Mutex::new(Some(sender)));
        let mut guard = SubscriptionGuard::default();

        let value_sender = Arc::clone(&sender);
        guard.push(self.subscribe(move |value: &V| {
            if let Some(sender) = value_sender.lock().take() {
                let _ = sender.send(Ok(value.clone()));
            }
        }));
        guard.push(self.on_error(move |err: &AtomError| {
            if let Some(sender) = sender.lock().take() {
                let _ = sender.send(Err(err.clone()));
            }
        }));

        // Checked after subscribing so a commit in between is not missed.
        if accept_current {
            match self.state() {
                AtomState::Ready(value) => return Ok(value),
                AtomState::Failed(err) => return Err(err),
                AtomState::Pending => {}
            }
        }

        receiver
            .await
            .unwrap_or_else(|_| Err(AtomError::Pending(self.id())))
    }

    /// Get the number of value subscribers, including dependency links.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Atoms this atom has subscribed to while deriving.
    ///
    /// Dependency links are permanent: an atom read by any past derivation
    /// stays in this list even if later derivations stop reading it.
    pub fn dependencies(&self) -> Vec<AtomId> {
        self.inner
            .derivation
            .as_ref()
            .map(Derivation::tracked)
            .unwrap_or_default()
    }
}

/// Create an independent primitive atom seeded with `source`'s current state.
///
/// This is a snapshot, not a live link: later writes to either atom do not
/// affect the other. Cloning a pending derived atom yields a pending
/// primitive atom that only a write will fill. A labelled source gives a
/// copy labelled `"<label> (copy)"`, so log lines can tell the two apart.
pub fn clone_atom<V>(source: &Atom<V>) -> Atom<V>
where
    V: Clone + Send + Sync + 'static,
{
    let label = source
        .inner
        .label
        .as_deref()
        .map(|label| Cow::Owned(format!("{label} (copy)")));
    Atom::from_parts(label, source.state(), None)
}

impl<V> Clone for Atom<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Debug for Atom<V>
where
    V: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn primitive_get_and_set() {
        let atom = Atom::new(0);
        assert_eq!(atom.kind(), AtomKind::Primitive);
        assert_eq!(atom.get(), Some(0));

        atom.set(42);
        assert_eq!(atom.get(), Some(42));
        assert_eq!(atom.get(), Some(42));
    }

    #[test]
    fn update_uses_current_value() {
        let atom = Atom::new(10);
        atom.update(|v| v + 5).expect("atom has a value");
        assert_eq!(atom.get(), Some(15));
    }

    #[test]
    fn update_on_pending_atom_fails() {
        let source = Atom::new(1);
        *source.inner.state.write() = AtomState::Pending;

        let err = source.update(|v| v + 1).unwrap_err();
        assert_eq!(err, AtomError::Pending(source.id()));
        assert!(source.is_pending());
    }

    #[test]
    fn primitive_notifies_on_every_write() {
        let atom = Atom::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let _subscription = atom.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        atom.set(1);
        atom.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let atom = Atom::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let unsubscribe = atom.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(atom.subscriber_count(), 1);

        atom.set(1);
        unsubscribe.unsubscribe();
        atom.set(2);

        // Should not have been called again
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(atom.subscriber_count(), 0);
    }

    #[test]
    fn same_callback_subscribed_twice_registers_twice() {
        let atom = Atom::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let callback = {
            let call_count = call_count.clone();
            Arc::new(move |_: &i32| {
                call_count.fetch_add(1, Ordering::SeqCst);
            })
        };

        let first = {
            let callback = Arc::clone(&callback);
            atom.subscribe(move |v| callback(v))
        };
        let second = {
            let callback = Arc::clone(&callback);
            atom.subscribe(move |v| callback(v))
        };

        atom.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        first.unsubscribe();
        atom.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);

        second.unsubscribe();
        atom.set(3);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn clone_handle_shares_state() {
        let atom1 = Atom::new(0);
        let atom2 = atom1.clone();

        atom1.set(42);
        assert_eq!(atom2.get(), Some(42));
        assert_eq!(atom1.id(), atom2.id());
    }

    #[test]
    fn clone_atom_is_independent() {
        let source = Atom::new_with(AtomConfig::new().label("source"), 7);
        let copy = clone_atom(&source);

        assert_ne!(source.id(), copy.id());
        assert_eq!(copy.get(), Some(7));
        assert_eq!(copy.label(), Some("source (copy)"));

        source.set(8);
        assert_eq!(copy.get(), Some(7));

        copy.set(9);
        assert_eq!(source.get(), Some(8));
    }

    #[test]
    fn derived_without_runtime_fails() {
        let err = Atom::computed(|_| Ok(1)).unwrap_err();
        assert_eq!(err, AtomError::NoRuntime);
    }

    #[tokio::test]
    async fn derived_starts_pending_then_resolves() {
        let atom = Atom::computed(|_| Ok(5)).expect("runtime available");

        assert_eq!(atom.kind(), AtomKind::Derived);
        assert!(atom.is_pending());
        assert_eq!(atom.get(), None);

        assert_eq!(atom.ready().await, Ok(5));
        assert_eq!(atom.get(), Some(5));
    }

    #[tokio::test]
    async fn ready_returns_current_value_immediately() {
        let atom = Atom::new(3);
        assert_eq!(atom.ready().await, Ok(3));
        // the waiter cleaned up after itself
        assert_eq!(atom.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn next_waits_for_a_write() {
        let atom = Atom::new(0);
        let writer = atom.clone();

        tokio::spawn(async move {
            tokio::task::yield_now().await;
            writer.set(11);
        });

        assert_eq!(atom.next().await, Ok(11));
        assert_eq!(atom.subscriber_count(), 0);
    }

    #[test]
    fn debug_output_includes_state() {
        let atom = Atom::new_with(AtomConfig::new().label("debuggable"), 1);
        let rendered = format!("{atom:?}");
        assert!(rendered.contains("debuggable"));
        assert!(rendered.contains("Ready(1)"));
    }
}
