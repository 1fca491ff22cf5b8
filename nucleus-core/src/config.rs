//! Per-atom configuration.

use std::borrow::Cow;

use tokio::runtime::Handle;

use crate::error::{AtomError, Result};

/// Options accepted by the `*_with` atom constructors.
///
/// # Example
///
/// ```rust,ignore
/// let total = Atom::computed_with(
///     AtomConfig::new().label("cart-total"),
///     move |get| Ok(get.get(&price)? * get.get(&quantity)?),
/// )?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct AtomConfig {
    label: Option<Cow<'static, str>>,
    runtime: Option<Handle>,
}

impl AtomConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Human-readable name attached to log events for this atom.
    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Runtime on which derivations are spawned.
    ///
    /// Without one, the runtime of the calling thread is used.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub(crate) fn take_label(&mut self) -> Option<Cow<'static, str>> {
        self.label.take()
    }

    pub(crate) fn resolve_runtime(&self) -> Result<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| AtomError::NoRuntime),
        }
    }
}
