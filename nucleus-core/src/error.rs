//! Error types for the atom store.
//!
//! Every failure the store can report is a variant of [`AtomError`]. The
//! type is `Clone` because a failed derivation is stored inside the atom's
//! state and handed to every error subscriber.

use std::any::Any;
use std::fmt::Display;

use thiserror::Error;

use crate::atom::AtomId;

/// Convenience alias used throughout the crate.
pub type Result<T, E = AtomError> = std::result::Result<T, E>;

/// Errors produced by atoms, derivations and consumer actions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtomError {
    /// The atom has no value yet. Its first derivation has not completed,
    /// or a recomputation is in flight.
    #[error("{0} has no value yet")]
    Pending(AtomId),

    /// A dependency read during derivation is in the failed state.
    #[error("dependency {atom} failed: {reason}")]
    Upstream { atom: AtomId, reason: String },

    /// A derivation function reported a failure.
    #[error("derivation failed: {0}")]
    Derivation(String),

    /// A derivation function panicked.
    #[error("derivation panicked: {0}")]
    Panicked(String),

    /// A derived atom was created with no tokio runtime to schedule on.
    #[error("derived atoms need a tokio runtime, but none is configured or running")]
    NoRuntime,

    /// A consumer asked for an action outside the closed action set.
    #[error("invalid action `{0}`")]
    InvalidAction(String),

    /// A counter action would move the count outside the `i64` range. The
    /// counter keeps its value.
    #[error("action `{action}` overflows {atom}")]
    Overflow { atom: AtomId, action: &'static str },
}

impl AtomError {
    /// Build a [`AtomError::Derivation`] from anything printable.
    pub fn derivation(reason: impl Display) -> Self {
        Self::Derivation(reason.to_string())
    }

    /// Whether this error only means "not ready yet".
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
