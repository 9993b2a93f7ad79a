//! Per-entry lifecycle state and memoized phase results

use crate::loader::error::{LoaderError, Result};
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a registry entry.
///
/// States are ordered; an entry only ever moves forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    /// Ready to fetch, or fetching, the module source.
    Fetch,
    /// Source is available; the module record is being (or about to be) parsed.
    Instantiate,
    /// Module record exists; dependencies are being requested.
    Satisfy,
    /// All dependencies are satisfied; the module may be linked.
    Link,
    /// Linking has started (or finished); the module may be evaluated.
    Ready,
}

impl ModuleState {
    /// Moves `self` forward to `target` if it is behind. Never lowers the state.
    pub fn raise_to(&mut self, target: ModuleState) -> bool {
        if *self < target {
            *self = target;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Fetch => "fetch",
            ModuleState::Instantiate => "instantiate",
            ModuleState::Satisfy => "satisfy",
            ModuleState::Link => "link",
            ModuleState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Future shared between every caller waiting on the same phase attempt.
pub type PhaseFuture<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Memoization cell for one asynchronous phase of an entry.
pub(crate) enum PhaseSlot<T: Clone> {
    NotStarted,
    InFlight { attempt: u64, future: PhaseFuture<T> },
    Done(Result<T>),
}

impl<T: Clone> PhaseSlot<T> {
    pub(crate) fn status(&self) -> SlotStatus {
        match self {
            PhaseSlot::NotStarted => SlotStatus::NotStarted,
            PhaseSlot::InFlight { .. } => SlotStatus::InFlight,
            PhaseSlot::Done(Ok(_)) => SlotStatus::Succeeded,
            PhaseSlot::Done(Err(_)) => SlotStatus::Failed,
        }
    }

    /// Whether the slot still holds the attempt identified by `attempt`.
    pub(crate) fn holds_attempt(&self, attempt: u64) -> bool {
        matches!(self, PhaseSlot::InFlight { attempt: current, .. } if *current == attempt)
    }

    /// Records the outcome of `attempt` unless a newer attempt or a forced
    /// value replaced it in the meantime.
    pub(crate) fn settle(&mut self, attempt: u64, result: Result<T>) -> bool {
        if self.holds_attempt(attempt) {
            *self = PhaseSlot::Done(result);
            true
        } else {
            false
        }
    }
}

impl<T: Clone> Default for PhaseSlot<T> {
    fn default() -> Self {
        PhaseSlot::NotStarted
    }
}

/// Observable status of a phase slot, used by diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotStatus {
    NotStarted,
    InFlight,
    Succeeded,
    Failed,
}

/// Outcome of the link pass for one entry. A failure is permanent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkOutcome {
    #[default]
    NotAttempted,
    Succeeded,
    Failed(LoaderError),
}

impl LinkOutcome {
    pub fn error(&self) -> Option<&LoaderError> {
        match self {
            LinkOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}
