//! Dependency Tracking
//!
//! A [`Getter`] is handed to every derivation pass. Reading an atom through
//! it returns the atom's value and, the first time that atom is seen by the
//! derived atom, links the two: the derived atom subscribes to the
//! dependency's value and error channels.
//!
//! # Equality Gate
//!
//! Each link remembers the last value it observed. A value notification
//! equal to that value is ignored, so no-op writes upstream do not cascade.
//!
//! A dependency that is recomputing sits in the placeholder state without
//! notifying anyone. A pass that reads it there marks the link as awaiting,
//! and the next commit passes the gate even if it repeats the old value.
//!
//! # Permanent Links
//!
//! Links are never removed. If a later pass stops reading a dependency, the
//! dependency still triggers recomputation when it changes. Links hold the
//! derived atom weakly, so they go quiet once the derived atom is dropped.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::cell::Atom;
use super::id::AtomId;
use super::state::AtomState;
use crate::error::{AtomError, Result};

/// A derived atom seen from the dependency side.
pub(crate) trait Dependent: Send + Sync {
    fn id(&self) -> AtomId;

    /// Record `dependency` and return its link. The flag is `true` if the
    /// link was created by this call. `None` if the atom cannot track.
    fn track(&self, dependency: AtomId) -> Option<(Arc<Link>, bool)>;

    /// A dependency changed; start a new pass.
    fn invalidate(self: Arc<Self>);
}

/// The dependent's half of one dependency link.
///
/// Its lock is held while a pass reads the dependency and while the link
/// handles a notification, so a commit is either seen by the read or
/// judged after it.
#[derive(Default)]
pub(crate) struct Link {
    /// A read found the dependency in the placeholder state. Cleared only
    /// by the next notification.
    awaiting: Mutex<bool>,
}

/// Read capability passed to derivations.
///
/// Cheap to clone and `Send`, so asynchronous derivations can carry it
/// across await points.
#[derive(Clone)]
pub struct Getter {
    dependent: Weak<dyn Dependent>,
}

impl Getter {
    pub(crate) fn new(dependent: Weak<dyn Dependent>) -> Self {
        Self { dependent }
    }

    /// Read `dependency` and make the current atom depend on it.
    ///
    /// # Errors
    ///
    /// - [`AtomError::Pending`] if `dependency` has no value yet. The link is
    ///   still made, so its next commit triggers another pass.
    /// - [`AtomError::Upstream`] if `dependency`'s last derivation failed.
    pub fn get<T>(&self, dependency: &Atom<T>) -> Result<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let tracked = self
            .dependent
            .upgrade()
            .and_then(|dependent| Some((dependent.track(dependency.id())?, dependent)));

        let observed = match tracked {
            Some(((link, true), dependent)) => connect(&dependent, &link, dependency),
            Some(((link, false), _)) => {
                let mut awaiting = link.awaiting.lock();
                let observed = dependency.state();
                if observed.is_pending() {
                    *awaiting = true;
                }
                observed
            }
            None => dependency.state(),
        };

        match observed {
            AtomState::Ready(value) => Ok(value),
            AtomState::Pending => Err(AtomError::Pending(dependency.id())),
            AtomState::Failed(err) => Err(AtomError::Upstream {
                atom: dependency.id(),
                reason: err.to_string(),
            }),
        }
    }

    /// Read `atom` without tracking it.
    pub fn peek<T>(&self, atom: &Atom<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        atom.get()
    }
}

impl std::fmt::Debug for Getter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Getter")
            .field("dependent", &self.dependent.upgrade().map(|d| d.id()))
            .finish()
    }
}

/// Subscribe `dependent` to `dependency`'s value and error channels, then
/// read the dependency and seed the link from that read.
///
/// Subscribing first means a write racing with the read is never lost: it
/// either lands before the read or reaches the link afterwards.
fn connect<T>(dependent: &Arc<dyn Dependent>, link: &Arc<Link>, dependency: &Atom<T>) -> AtomState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let dependent_id = dependent.id();
    let dependency_id = dependency.id();
    let last_seen: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
    let target = Arc::downgrade(dependent);

    let on_value = {
        let link = Arc::clone(link);
        let last_seen = Arc::clone(&last_seen);
        let target = target.clone();
        move |value: &T| {
            {
                let mut awaiting = link.awaiting.lock();
                let mut seen = last_seen.lock();
                if !*awaiting && seen.as_ref() == Some(value) {
                    trace!(dependent = %dependent_id, dependency = %dependency_id, "dependency unchanged");
                    return;
                }
                *awaiting = false;
                *seen = Some(value.clone());
            }
            if let Some(dependent) = target.upgrade() {
                dependent.invalidate();
            }
        }
    };

    let on_error = {
        let link = Arc::clone(link);
        let last_seen = Arc::clone(&last_seen);
        move |_: &AtomError| {
            {
                let mut awaiting = link.awaiting.lock();
                *awaiting = false;
                *last_seen.lock() = None;
            }
            if let Some(dependent) = target.upgrade() {
                dependent.invalidate();
            }
        }
    };

    dependency.subscribe(on_value).detach();
    dependency.on_error(on_error).detach();

    let observed = {
        let mut awaiting = link.awaiting.lock();
        let observed = dependency.state();
        if observed.is_pending() {
            *awaiting = true;
        }
        *last_seen.lock() = observed.value().cloned();
        observed
    };

    debug!(dependent = %dependent_id, dependency = %dependency_id, "tracking dependency");
    observed
}
