//! Module Loader - asynchronous, cycle-tolerant module graph loading
//!
//! This crate resolves, fetches, parses and instantiates modules, waits for
//! their transitive dependencies even when the graph is circular, then links
//! and evaluates them exactly once. Host behavior is supplied through
//! [`LoaderHooks`]; [`script::ScriptHooks`] runs a small text module format.

pub mod cli;
pub mod config;
pub mod loader;
pub mod script;

pub use config::{ConfigError, ConfigFormat, LoaderConfig};
pub use loader::{LoaderError, LoaderHooks, ModuleKey, ModuleLoader, ModuleState};
