//! Shared test hooks and fixtures for loader integration tests
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use module_loader::loader::{LoaderHooks, ModuleKey, ModuleLoader};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// Parsed mock module: its key and requested dependency names.
#[derive(Debug, Clone)]
pub struct MockRecord {
    pub key: ModuleKey,
    pub dependencies: Vec<String>,
}

/// Namespace view returned by [`GraphHooks`]: the module key and its imports.
#[derive(Debug, Clone, PartialEq)]
pub struct MockNamespace {
    pub key: String,
    pub dependencies: Vec<String>,
}

/// Calls observed by [`GraphHooks`], keyed by module key.
#[derive(Debug, Default)]
pub struct CallLog {
    pub fetches: HashMap<String, usize>,
    pub fetch_params: Vec<(String, Option<String>)>,
    pub parses: HashMap<String, usize>,
    pub links: HashMap<String, usize>,
    pub evaluations: Vec<String>,
}

/// In-memory module graph. A module's source is its dependency names
/// separated by whitespace; source starting with `!` fails to parse.
#[derive(Default)]
pub struct GraphHooks {
    modules: Mutex<HashMap<String, String>>,
    fetch_failures: Mutex<HashMap<String, usize>>,
    pending_fetches: Mutex<HashSet<String>>,
    link_failures: Mutex<HashSet<String>>,
    evaluate_failures: Mutex<HashSet<String>>,
    calls: Mutex<CallLog>,
}

impl GraphHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds hooks from `(key, dependencies)` pairs.
    pub fn with_graph(modules: &[(&str, &[&str])]) -> Self {
        let hooks = Self::new();
        for (key, deps) in modules {
            hooks.add_module(key, deps);
        }
        hooks
    }

    pub fn add_module(&self, key: &str, deps: &[&str]) {
        self.modules.lock().insert(key.to_string(), deps.join(" "));
    }

    pub fn add_source(&self, key: &str, source: &str) {
        self.modules.lock().insert(key.to_string(), source.to_string());
    }

    /// The next `times` fetches of `key` fail.
    pub fn fail_fetch(&self, key: &str, times: usize) {
        self.fetch_failures.lock().insert(key.to_string(), times);
    }

    /// Fetches of `key` never complete on their own.
    pub fn hang_fetch(&self, key: &str) {
        self.pending_fetches.lock().insert(key.to_string());
    }

    pub fn fail_link(&self, key: &str) {
        self.link_failures.lock().insert(key.to_string());
    }

    pub fn fail_evaluate(&self, key: &str) {
        self.evaluate_failures.lock().insert(key.to_string());
    }

    pub fn fetch_count(&self, key: &str) -> usize {
        self.calls.lock().fetches.get(key).copied().unwrap_or(0)
    }

    pub fn parse_count(&self, key: &str) -> usize {
        self.calls.lock().parses.get(key).copied().unwrap_or(0)
    }

    pub fn link_count(&self, key: &str) -> usize {
        self.calls.lock().links.get(key).copied().unwrap_or(0)
    }

    pub fn evaluations(&self) -> Vec<String> {
        self.calls.lock().evaluations.clone()
    }

    pub fn fetch_params(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().fetch_params.clone()
    }
}

#[async_trait]
impl LoaderHooks for GraphHooks {
    type Source = String;
    type Record = MockRecord;
    type Namespace = MockNamespace;
    type Params = String;
    type Fetcher = ();

    async fn resolve(
        &self,
        name: &str,
        _referrer: Option<&ModuleKey>,
        _fetcher: &(),
    ) -> Result<ModuleKey> {
        if name.is_empty() {
            bail!("empty module name");
        }
        Ok(ModuleKey::from(name))
    }

    fn resolve_sync(&self, name: &str, _referrer: &ModuleKey, _fetcher: &()) -> Result<ModuleKey> {
        Ok(ModuleKey::from(name))
    }

    async fn fetch(
        &self,
        key: &ModuleKey,
        params: Option<&String>,
        _fetcher: &(),
    ) -> Result<String> {
        {
            let mut calls = self.calls.lock();
            *calls.fetches.entry(key.to_string()).or_default() += 1;
            calls
                .fetch_params
                .push((key.to_string(), params.cloned()));
        }

        // Suspend once so concurrent requests join this attempt.
        tokio::task::yield_now().await;

        let hang = self.pending_fetches.lock().contains(key.as_str());
        if hang {
            futures::future::pending::<()>().await;
        }

        {
            let mut failures = self.fetch_failures.lock();
            if let Some(remaining) = failures.get_mut(key.as_str()) {
                if *remaining > 0 {
                    *remaining -= 1;
                    bail!("transient failure fetching {key}");
                }
            }
        }

        let source = self.modules.lock().get(key.as_str()).cloned();
        match source {
            Some(source) => Ok(source),
            None => bail!("no module named {key}"),
        }
    }

    fn parse_module(&self, key: &ModuleKey, source: &String) -> Result<MockRecord> {
        *self
            .calls
            .lock()
            .parses
            .entry(key.to_string())
            .or_default() += 1;

        if source.starts_with('!') {
            bail!("syntax error in {key}");
        }
        Ok(MockRecord {
            key: key.clone(),
            dependencies: source.split_whitespace().map(str::to_string).collect(),
        })
    }

    fn requested_modules(&self, record: &MockRecord) -> Vec<String> {
        record.dependencies.clone()
    }

    fn module_declaration_instantiation(
        &self,
        _record: &MockRecord,
        key: &ModuleKey,
        _fetcher: &(),
    ) -> Result<()> {
        *self
            .calls
            .lock()
            .links
            .entry(key.to_string())
            .or_default() += 1;

        if self.link_failures.lock().contains(key.as_str()) {
            bail!("unresolvable binding in {key}");
        }
        Ok(())
    }

    async fn evaluate(&self, key: &ModuleKey, _record: &MockRecord, _fetcher: &()) -> Result<()> {
        self.calls.lock().evaluations.push(key.to_string());
        tokio::task::yield_now().await;

        if self.evaluate_failures.lock().contains(key.as_str()) {
            bail!("body of {key} threw");
        }
        Ok(())
    }

    fn namespace_object(&self, record: &MockRecord) -> MockNamespace {
        MockNamespace {
            key: record.key.to_string(),
            dependencies: record.dependencies.clone(),
        }
    }
}

/// Loader over `hooks` plus a handle to inspect the recorded calls.
pub fn create_test_loader(hooks: GraphHooks) -> (ModuleLoader<GraphHooks>, Arc<GraphHooks>) {
    let hooks = Arc::new(hooks);
    (ModuleLoader::with_hooks(hooks.clone()), hooks)
}

pub fn key(name: &str) -> ModuleKey {
    ModuleKey::from(name)
}

/// Temporary directory of script modules.
pub struct ScriptEnvironment {
    temp_dir: TempDir,
}

impl ScriptEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("Failed to create temporary directory"),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Writes `content` to `name` below the root, creating parent directories.
    pub fn write_module(&self, name: &str, content: &str) -> std::path::PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create module directory");
        }
        std::fs::write(&path, content).expect("Failed to write module");
        path
    }
}
