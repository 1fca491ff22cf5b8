//! Host Integration
//!
//! UI frameworks pull state during render; atoms push changes. This module
//! bridges the two with the "external store" pattern: a store exposes
//! `subscribe` and `get_snapshot`, and a [`Hook`] mounted in a host
//! component turns change notifications into render requests.
//!
//! # Guarantees
//!
//! 1. [`Hook::snapshot`] always returns the store's latest committed value.
//! 2. Changes between two renders produce a single render request.
//! 3. Dropping the hook (component teardown) unsubscribes it.
//!
//! # Example
//!
//! ```rust,ignore
//! let count = Atom::new(0);
//! let binding = read_write(&count, move || ui.schedule_redraw());
//!
//! // inside the component's render function
//! let (value, set_count) = binding.read();
//! if clicked {
//!     set_count.set(value.unwrap_or_default() + 1);
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::atom::{Atom, SubscriptionGuard, Unsubscribe};
use crate::error::Result;

/// Change listener registered by a host.
pub type Listener = Box<dyn Fn() + Send + Sync>;

/// A source of state a host can subscribe to and read synchronously.
pub trait ExternalStore: Send + Sync {
    type Snapshot;

    /// Register `listener` to be called after every change.
    fn subscribe(&self, listener: Listener) -> Unsubscribe;

    /// Read the current state.
    fn get_snapshot(&self) -> Self::Snapshot;
}

impl<V> ExternalStore for Atom<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Snapshot = Option<V>;

    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        // failures change the snapshot too (it becomes None)
        let listener: Arc<dyn Fn() + Send + Sync> = Arc::from(listener);
        let on_error = Arc::clone(&listener);
        Unsubscribe::merge([
            Atom::subscribe(self, move |_| listener()),
            self.on_error(move |_| on_error()),
        ])
    }

    fn get_snapshot(&self) -> Option<V> {
        self.get()
    }
}

/// The host's re-render entry point.
pub trait RenderHost: Send + Sync {
    fn request_render(&self);
}

impl<F> RenderHost for F
where
    F: Fn() + Send + Sync,
{
    fn request_render(&self) {
        (self)()
    }
}

/// A store mounted in a host component.
pub struct Hook<S: ExternalStore> {
    store: S,
    /// Set by the first change after a render, cleared by the next render.
    stale: Arc<AtomicBool>,
    _subscription: SubscriptionGuard,
}

impl<S: ExternalStore> Hook<S> {
    /// Subscribe `host` to `store`.
    pub fn mount<H>(store: S, host: H) -> Self
    where
        H: RenderHost + 'static,
    {
        let stale = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stale);
        let listener: Listener = Box::new(move || {
            if !flag.swap(true, Ordering::SeqCst) {
                trace!("requesting render");
                host.request_render();
            }
        });

        let mut subscription = SubscriptionGuard::default();
        subscription.push(store.subscribe(listener));

        Self {
            store,
            stale,
            _subscription: subscription,
        }
    }

    /// Read the store for a render.
    pub fn snapshot(&self) -> S::Snapshot {
        self.stale.store(false, Ordering::SeqCst);
        self.store.get_snapshot()
    }

    /// Whether a change arrived since the last [`snapshot`](Self::snapshot).
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }
}

/// Write half handed to host components.
pub struct Setter<V>
where
    V: Clone + Send + Sync + 'static,
{
    atom: Atom<V>,
}

impl<V> Setter<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn set(&self, value: V) {
        self.atom.set(value);
    }

    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&V) -> V,
    {
        self.atom.update(f)
    }
}

impl<V> Clone for Setter<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
        }
    }
}

/// Read-and-write binding of an atom to a host.
pub struct ReadWrite<V>
where
    V: Clone + Send + Sync + 'static,
{
    hook: Hook<Atom<V>>,
}

impl<V> ReadWrite<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Current value plus a setter.
    pub fn read(&self) -> (Option<V>, Setter<V>) {
        let value = self.hook.snapshot();
        let setter = Setter {
            atom: self.hook.store().clone(),
        };
        (value, setter)
    }

    pub fn is_stale(&self) -> bool {
        self.hook.is_stale()
    }
}

/// Read-only binding of an atom to a host.
pub struct ReadOnly<V>
where
    V: Clone + Send + Sync + 'static,
{
    hook: Hook<Atom<V>>,
}

impl<V> ReadOnly<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn read(&self) -> Option<V> {
        self.hook.snapshot()
    }

    pub fn is_stale(&self) -> bool {
        self.hook.is_stale()
    }
}

/// Bind `atom` to `host`, exposing the value and a setter.
pub fn read_write<V, H>(atom: &Atom<V>, host: H) -> ReadWrite<V>
where
    V: Clone + Send + Sync + 'static,
    H: RenderHost + 'static,
{
    ReadWrite {
        hook: Hook::mount(atom.clone(), host),
    }
}

/// Bind `atom` to `host`, exposing only the value.
pub fn read_only<V, H>(atom: &Atom<V>, host: H) -> ReadOnly<V>
where
    V: Clone + Send + Sync + 'static,
    H: RenderHost + 'static,
{
    ReadOnly {
        hook: Hook::mount(atom.clone(), host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AtomError;
    use std::sync::atomic::AtomicUsize;

    fn counting_host() -> (Arc<AtomicUsize>, impl RenderHost + 'static) {
        let renders = Arc::new(AtomicUsize::new(0));
        let renders_clone = renders.clone();
        let host = move || {
            renders_clone.fetch_add(1, Ordering::SeqCst);
        };
        (renders, host)
    }

    #[test]
    fn snapshot_reflects_latest_value() {
        let atom = Atom::new(1);
        let (_, host) = counting_host();
        let binding = read_only(&atom, host);

        assert_eq!(binding.read(), Some(1));
        atom.set(2);
        assert_eq!(binding.read(), Some(2));
    }

    #[test]
    fn changes_between_renders_coalesce() {
        let atom = Atom::new(0);
        let (renders, host) = counting_host();
        let binding = read_only(&atom, host);

        atom.set(1);
        atom.set(2);
        atom.set(3);
        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert!(binding.is_stale());

        assert_eq!(binding.read(), Some(3));
        assert!(!binding.is_stale());

        atom.set(4);
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn setter_writes_through() {
        let atom = Atom::new(10);
        let (renders, host) = counting_host();
        let binding = read_write(&atom, host);

        let (value, set) = binding.read();
        assert_eq!(value, Some(10));

        set.set(11);
        assert_eq!(atom.get(), Some(11));
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        set.update(|v| v * 2).expect("atom has a value");
        assert_eq!(binding.read().0, Some(22));
    }

    #[test]
    fn dropping_binding_unsubscribes() {
        let atom = Atom::new(0);
        let (renders, host) = counting_host();
        let binding = read_write(&atom, host);
        assert_eq!(atom.subscriber_count(), 1);

        drop(binding);
        assert_eq!(atom.subscriber_count(), 0);

        atom.set(1);
        assert_eq!(renders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn derivation_failure_requests_render() {
        let source = Atom::new(1);
        let source_clone = source.clone();
        let checked = Atom::computed(move |get| {
            let value = get.get(&source_clone)?;
            if value < 0 {
                Err(AtomError::derivation("negative"))
            } else {
                Ok(value)
            }
        })
        .expect("runtime available");
        assert_eq!(checked.ready().await, Ok(1));

        let (renders, host) = counting_host();
        let binding = read_only(&checked, host);

        source.set(-1);
        assert!(checked.next().await.is_err());
        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert_eq!(binding.read(), None);
    }
}
