//! Module loading pipeline: fetch, instantiate, satisfy, link, evaluate

pub mod error;
pub mod fetch;
pub mod hooks;
pub mod instantiate;
pub mod link;
pub mod pipeline;
pub mod registry;
pub mod satisfy;
pub mod state;

// Re-export commonly used types
pub use error::{LoaderError, Result};
pub use hooks::LoaderHooks;
pub use pipeline::{ModuleLoader, VisitedSet};
pub use registry::{Entry, EntryId, EntrySnapshot, LinkStatus, ModuleKey, Registry};
pub use state::{LinkOutcome, ModuleState, PhaseFuture, SlotStatus};
