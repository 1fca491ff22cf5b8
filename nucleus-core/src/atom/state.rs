//! Atom state and kind.

use crate::error::AtomError;

/// What kind of atom this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomKind {
    /// Value set only by explicit writes.
    Primitive,

    /// Value computed from other atoms by a derivation function.
    Derived,
}

/// The materialized value of an atom.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomState<V> {
    /// Placeholder. A derived atom is in this state before its first pass
    /// and while a recomputation is in flight.
    Pending,

    /// A committed value.
    Ready(V),

    /// The most recent derivation failed.
    Failed(AtomError),
}

impl<V> AtomState<V> {
    /// The committed value, if there is one.
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Pending | Self::Failed(_) => None,
        }
    }

    /// Consume the state, keeping only a committed value.
    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Pending | Self::Failed(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The stored failure, if the last derivation failed.
    pub fn error(&self) -> Option<&AtomError> {
        match self {
            Self::Failed(err) => Some(err),
            Self::Pending | Self::Ready(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        let ready = AtomState::Ready(3);
        assert_eq!(ready.value(), Some(&3));
        assert!(ready.is_ready());
        assert!(ready.error().is_none());

        let pending: AtomState<i32> = AtomState::Pending;
        assert!(pending.is_pending());
        assert_eq!(pending.into_value(), None);

        let failed: AtomState<i32> = AtomState::Failed(AtomError::derivation("nope"));
        assert_eq!(failed.value(), None);
        assert_eq!(failed.error(), Some(&AtomError::Derivation("nope".into())));
    }
}
