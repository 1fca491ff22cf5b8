//! Atoms
//!
//! This module implements the atom: the store's single reactive primitive.
//!
//! # Concepts
//!
//! ## Primitive atoms
//!
//! A primitive atom holds a value that changes only when someone writes to
//! it. Every write notifies every subscriber.
//!
//! ## Derived atoms
//!
//! A derived atom computes its value from other atoms. Its derivation
//! receives a [`Getter`]; reading an atom through the getter subscribes the
//! derived atom to it. When a dependency commits a value different from the
//! one last observed, the derived atom recomputes on the tokio runtime.
//!
//! ## Placeholder window
//!
//! Between the start of a recomputation and its commit the atom reads as
//! [`AtomState::Pending`]. This is the store's eventual-consistency window;
//! [`Atom::ready`] and [`Atom::next`] wait it out.
//!
//! # Implementation Notes
//!
//! There is no central scheduler or registry. Each atom owns its value, its
//! subscribers and, for derived atoms, its dependency links. A link is a
//! plain subscription on the dependency that holds the derived atom weakly.

mod cell;
mod derive;
mod getter;
mod id;
mod state;
mod subscriber;

pub use cell::{clone_atom, Atom};
pub use getter::Getter;
pub use id::{AtomId, SubscriberId};
pub use state::{AtomKind, AtomState};
pub use subscriber::Unsubscribe;

pub(crate) use subscriber::SubscriptionGuard;
