//! Derivation and Recomputation
//!
//! A derived atom owns a [`Derivation`]: the user's derivation function, the
//! runtime it runs on, the set of dependencies it has subscribed to, and two
//! generation counters.
//!
//! # How Recomputation Works
//!
//! 1. A pass starts: the `started` generation is bumped and the atom's state
//!    is reset to the placeholder.
//!
//! 2. The derivation is spawned on the runtime. Readers that run before it
//!    completes observe the placeholder.
//!
//! 3. When the derivation resolves, the result is committed only if its
//!    generation is not older than the last committed one. Passes can finish
//!    out of order; a stale pass is dropped instead of overwriting a newer
//!    value.
//!
//! 4. A committed value goes to value subscribers, a failure goes to error
//!    subscribers. A derivation that only reports a pending dependency
//!    leaves the atom pending and notifies nobody: that dependency's own
//!    commit will trigger the next pass.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tracing::{debug, debug_span, trace, warn, Instrument};

use super::cell::AtomInner;
use super::getter::{Dependent, Getter, Link};
use super::id::AtomId;
use super::state::AtomState;
use crate::error::{panic_message, AtomError, Result};

type DeriveFn<V> = dyn Fn(Getter) -> BoxFuture<'static, Result<V>> + Send + Sync;

/// Everything a derived atom needs to recompute itself.
pub(crate) struct Derivation<V> {
    compute: Box<DeriveFn<V>>,

    runtime: Handle,

    /// Dependencies subscribed to so far, with their links. Never cleared.
    tracked: Mutex<SmallVec<[(AtomId, Arc<Link>); 4]>>,

    /// Generation of the most recently started pass.
    started: AtomicU64,

    /// Generation of the most recently committed pass or write.
    committed: AtomicU64,
}

impl<V> Derivation<V> {
    pub(crate) fn new<F>(runtime: Handle, compute: F) -> Self
    where
        F: Fn(Getter) -> BoxFuture<'static, Result<V>> + Send + Sync + 'static,
    {
        Self {
            compute: Box::new(compute),
            runtime,
            tracked: Mutex::new(SmallVec::new()),
            started: AtomicU64::new(0),
            committed: AtomicU64::new(0),
        }
    }

    fn begin(&self) -> u64 {
        self.started.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Mark every pass started so far as stale.
    ///
    /// Must be called with the atom's state lock held.
    pub(crate) fn supersede(&self) {
        let generation = self.begin();
        self.committed.store(generation, Ordering::SeqCst);
    }

    /// Decide whether a finished pass may commit.
    ///
    /// Must be called with the atom's state lock held.
    fn accept(&self, generation: u64) -> bool {
        if generation < self.committed.load(Ordering::SeqCst) {
            return false;
        }
        self.committed.store(generation, Ordering::SeqCst);
        true
    }

    /// Record a dependency and return its link, creating the link the first
    /// time `dependency` is seen.
    pub(crate) fn track(&self, dependency: AtomId) -> (Arc<Link>, bool) {
        let mut tracked = self.tracked.lock();
        if let Some((_, link)) = tracked.iter().find(|(id, _)| *id == dependency) {
            return (Arc::clone(link), false);
        }
        let link = Arc::new(Link::default());
        tracked.push((dependency, Arc::clone(&link)));
        (link, true)
    }

    pub(crate) fn tracked(&self) -> Vec<AtomId> {
        self.tracked.lock().iter().map(|(id, _)| *id).collect()
    }
}

impl<V> AtomInner<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Start a recomputation pass. No-op for primitive atoms.
    pub(crate) fn recompute(self: &Arc<Self>) {
        let Some(derivation) = self.derivation.as_ref() else {
            return;
        };

        let generation = {
            let mut state = self.state.write();
            let generation = derivation.begin();
            *state = AtomState::Pending;
            generation
        };

        debug!(atom = %self.id, label = self.label.as_deref(), generation, "scheduling recomputation");

        let span = debug_span!("derive", atom = %self.id, label = self.label.as_deref(), generation);
        let atom = Arc::clone(self);
        derivation
            .runtime
            .spawn(async move { atom.run_derivation(generation).await }.instrument(span));
    }

    async fn run_derivation(self: Arc<Self>, generation: u64) {
        let Some(derivation) = self.derivation.as_ref() else {
            return;
        };

        let getter = {
            let dependent: Arc<dyn Dependent> = self.clone();
            Getter::new(Arc::downgrade(&dependent))
        };

        let outcome = AssertUnwindSafe(async { (derivation.compute)(getter).await })
            .catch_unwind()
            .await;
        let result = outcome.unwrap_or_else(|payload| Err(AtomError::Panicked(panic_message(&*payload))));

        self.commit(generation, result);
    }

    fn commit(&self, generation: u64, result: Result<V>) {
        let Some(derivation) = self.derivation.as_ref() else {
            return;
        };

        let mut state = self.state.write();
        if !derivation.accept(generation) {
            drop(state);
            debug!(atom = %self.id, generation, "discarding stale recomputation");
            return;
        }

        match result {
            Ok(value) => {
                *state = AtomState::Ready(value.clone());
                drop(state);
                debug!(atom = %self.id, generation, "committed recomputation");
                self.subscribers.notify(self.id, &value);
            }
            Err(err) if err.is_pending() => {
                *state = AtomState::Pending;
                drop(state);
                trace!(atom = %self.id, reason = %err, "waiting on pending dependency");
            }
            Err(err) => {
                *state = AtomState::Failed(err.clone());
                drop(state);
                warn!(atom = %self.id, generation, error = %err, "derivation failed");
                self.error_subscribers.notify(self.id, &err);
            }
        }
    }
}

impl<V> Dependent for AtomInner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn id(&self) -> AtomId {
        self.id
    }

    fn track(&self, dependency: AtomId) -> Option<(Arc<Link>, bool)> {
        self.derivation
            .as_ref()
            .map(|derivation| derivation.track(dependency))
    }

    fn invalidate(self: Arc<Self>) {
        self.recompute();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    fn derivation() -> Derivation<i32> {
        Derivation::new(Handle::current(), |_| async { Ok::<_, AtomError>(0) }.boxed())
    }

    #[tokio::test]
    async fn track_reports_first_sighting_only() {
        let derivation = derivation();
        let a = AtomId::next();
        let b = AtomId::next();

        let (first, created) = derivation.track(a);
        assert!(created);
        let (again, created) = derivation.track(a);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &again));
        assert!(derivation.track(b).1);
        assert_eq!(derivation.tracked(), vec![a, b]);
    }

    #[tokio::test]
    async fn stale_generations_are_rejected() {
        let derivation = derivation();
        let first = derivation.begin();
        let second = derivation.begin();

        assert!(derivation.accept(second));
        assert!(!derivation.accept(first));
    }

    #[tokio::test]
    async fn supersede_rejects_everything_in_flight() {
        let derivation = derivation();
        let in_flight = derivation.begin();

        derivation.supersede();
        assert!(!derivation.accept(in_flight));

        let next = derivation.begin();
        assert!(derivation.accept(next));
    }

    #[tokio::test]
    async fn derivation_runs_once_per_pass() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let atom = Atom::computed(move |_| {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        .expect("runtime available");

        // Not run until the runtime gets a turn
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        assert_eq!(atom.ready().await, Ok(1));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_derivation_becomes_failure() {
        let atom: Atom<i32> = Atom::computed(|_| panic!("derivation exploded")).expect("runtime available");

        let err = atom.ready().await.unwrap_err();
        assert_eq!(err, AtomError::Panicked("derivation exploded".to_owned()));
        assert_eq!(atom.state(), AtomState::Failed(err));
    }

    #[tokio::test(start_paused = true)]
    async fn write_to_derived_atom_supersedes_in_flight_pass() {
        let atom = Atom::derived(|_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, AtomError>(1)
        })
        .expect("runtime available");

        // Let the first pass start and park on its sleep
        tokio::task::yield_now().await;
        atom.set(99);
        assert_eq!(atom.get(), Some(99));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(atom.get(), Some(99));
    }
}
