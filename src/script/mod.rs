//! Script module format and the loader hooks that run it

pub mod error;
pub mod hooks;
pub mod parser;

pub use error::ScriptError;
pub use hooks::{ScriptHooks, ScriptNamespace, ScriptRecord, UNINITIALIZED};
pub use parser::{PrintArg, ScriptModule, Statement};
