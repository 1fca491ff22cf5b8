//! Identifier types for atoms and subscriptions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an atom.
///
/// Ids are handed out from a process-wide counter, so two atoms never share
/// one. Cloning an [`Atom`](super::Atom) handle keeps the id; creating a new
/// atom with [`clone_atom`](super::clone_atom) does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u64);

impl AtomId {
    /// Generate a new unique atom ID.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atom#{}", self.0)
    }
}

/// Unique identifier for one registration on an atom's subscriber list.
///
/// Subscribing the same callback twice yields two ids, and each must be
/// unsubscribed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_ids_are_unique() {
        let id1 = AtomId::next();
        let id2 = AtomId::next();
        let id3 = AtomId::next();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_ids_are_unique() {
        assert_ne!(SubscriberId::next(), SubscriberId::next());
    }

    #[test]
    fn display_includes_raw_value() {
        let id = AtomId::next();
        assert_eq!(id.to_string(), format!("atom#{}", id.raw()));
    }
}
