//! Nucleus Core
//!
//! This crate provides the engine of the Nucleus atom store: small units of
//! state that can be read, written, derived from one another and observed,
//! without a central scheduler.
//!
//! It implements:
//!
//! - Primitive and derived atoms
//! - Dependency tracking with equality-gated propagation
//! - Asynchronous recomputation on the tokio runtime
//! - Subscribe/notify with an explicit error channel
//! - Bridging to pull-based UI hosts
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `atom`: Atoms, dependency tracking and recomputation
//! - `host`: External-store hooks for UI frameworks
//! - `actions`: Closed action set for counter-style consumers
//! - `config`: Per-atom configuration
//! - `error`: Error taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use nucleus_core::atom::Atom;
//!
//! // Create a primitive atom
//! let count = Atom::new(0);
//!
//! // Create a derived atom
//! let doubled = Atom::computed({
//!     let count = count.clone();
//!     move |get| Ok(get.get(&count)? * 2)
//! })?;
//!
//! // Observe it
//! let unsubscribe = doubled.subscribe(|value| println!("Doubled: {value}"));
//!
//! // Update the primitive atom
//! count.set(5);
//! assert_eq!(doubled.next().await?, 10);
//! // Subscriber runs, prints: "Doubled: 10"
//!
//! unsubscribe.unsubscribe();
//! ```

pub mod actions;
pub mod atom;
pub mod config;
pub mod error;
pub mod host;

pub use atom::{clone_atom, Atom, AtomId, AtomKind, AtomState, Getter, Unsubscribe};
pub use config::AtomConfig;
pub use error::{AtomError, Result};
