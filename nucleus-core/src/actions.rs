//! Counter actions.
//!
//! Consumers drive a counter atom through a closed set of actions. Action
//! names arriving from the outside (button ids, JSON messages) are parsed
//! into [`CounterAction`]; anything outside the set is rejected with
//! [`AtomError::InvalidAction`] instead of being ignored.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::atom::Atom;
use crate::error::{AtomError, Result};

/// Upper bound (inclusive) for [`CounterAction::Random`].
pub const RANDOM_MAX: i64 = 100;

/// Operations a consumer may request on a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterAction {
    Increment,
    Decrement,
    Reset,
    /// Replace the count with a random value in `0..=RANDOM_MAX`.
    Random,
}

impl CounterAction {
    pub const ALL: [CounterAction; 4] = [
        CounterAction::Increment,
        CounterAction::Decrement,
        CounterAction::Reset,
        CounterAction::Random,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterAction::Increment => "increment",
            CounterAction::Decrement => "decrement",
            CounterAction::Reset => "reset",
            CounterAction::Random => "random",
        }
    }

    /// Apply the action to `counter` and return the written value.
    ///
    /// Stepping past `i64::MAX` or `i64::MIN` fails with
    /// [`AtomError::Overflow`] and leaves the counter untouched.
    pub fn apply(self, counter: &Atom<i64>) -> Result<i64> {
        let overflow = || AtomError::Overflow {
            atom: counter.id(),
            action: self.as_str(),
        };
        let next = match self {
            CounterAction::Increment => current(counter)?.checked_add(1).ok_or_else(overflow)?,
            CounterAction::Decrement => current(counter)?.checked_sub(1).ok_or_else(overflow)?,
            CounterAction::Reset => 0,
            CounterAction::Random => rand::rng().random_range(0..=RANDOM_MAX),
        };
        debug!(atom = %counter.id(), action = self.as_str(), value = next, "applying counter action");
        counter.set(next);
        Ok(next)
    }
}

fn current(counter: &Atom<i64>) -> Result<i64> {
    counter.get().ok_or(AtomError::Pending(counter.id()))
}

impl FromStr for CounterAction {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self> {
        CounterAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| AtomError::InvalidAction(s.to_owned()))
    }
}

impl fmt::Display for CounterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse `action` and apply it to `counter`.
pub fn dispatch(counter: &Atom<i64>, action: &str) -> Result<i64> {
    action.parse::<CounterAction>()?.apply(counter)
}
