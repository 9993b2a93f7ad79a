//! Loader hooks for script modules stored on disk or registered in memory

use crate::config::LoaderConfig;
use crate::loader::{LoaderHooks, ModuleKey};
use crate::script::error::ScriptError;
use crate::script::parser::{PrintArg, ScriptModule, Statement};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Printed for a binding whose owning module has not assigned it yet.
pub const UNINITIALIZED: &str = "<uninitialized>";

/// Export name to current value, as seen by an importer.
pub type ScriptNamespace = BTreeMap<String, Value>;

#[derive(Default)]
struct BindingState {
    /// Parsed modules, for link-time export checks.
    modules: HashMap<ModuleKey, ScriptModule>,
    /// Import bindings: importer -> local name -> module exporting it.
    imports: HashMap<ModuleKey, HashMap<String, ModuleKey>>,
    /// Re-exports: module -> export name -> module it forwards to.
    forwards: HashMap<ModuleKey, HashMap<String, ModuleKey>>,
    /// Values assigned by evaluated module bodies.
    values: HashMap<ModuleKey, HashMap<String, Value>>,
}

impl BindingState {
    /// Current value of `name` as exported by `owner`, following re-exports.
    fn lookup(&self, owner: &ModuleKey, name: &str) -> Option<Value> {
        let mut owner = owner;
        // A chain longer than the number of modules means re-exports form a loop.
        for _ in 0..=self.modules.len() {
            if let Some(value) = self.values.get(owner).and_then(|values| values.get(name)) {
                return Some(value.clone());
            }
            owner = self.forwards.get(owner)?.get(name)?;
        }
        None
    }
}

/// Module record handed to the loader: the parsed module and its key.
#[derive(Debug, Clone)]
pub struct ScriptRecord {
    pub key: ModuleKey,
    pub module: ScriptModule,
}

/// Hooks resolving specifiers as paths and running the script module format.
pub struct ScriptHooks {
    root: PathBuf,
    extension: String,
    sources: Mutex<HashMap<ModuleKey, String>>,
    bindings: Mutex<BindingState>,
    output: Mutex<Vec<String>>,
}

impl ScriptHooks {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
            extension: LoaderConfig::default().extension,
            sources: Mutex::new(HashMap::new()),
            bindings: Mutex::new(BindingState::default()),
            output: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.root_dir.clone()).with_extension(config.extension.as_str())
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Registers in-memory source for a specifier resolved against the root.
    /// Registered sources take precedence over files on disk.
    pub fn with_source(
        self,
        spec: &str,
        source: impl Into<String>,
    ) -> std::result::Result<Self, ScriptError> {
        let key = self.resolve_spec(spec, None)?;
        self.sources.lock().insert(key, source.into());
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lines printed by evaluated module bodies so far.
    pub fn output(&self) -> Vec<String> {
        self.output.lock().clone()
    }

    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.lock())
    }

    /// Resolves a specifier to a normalized path key. Relative specifiers
    /// (`./`, `../`) resolve against the referrer's directory, bare ones
    /// against the root.
    pub fn resolve_spec(
        &self,
        spec: &str,
        referrer: Option<&ModuleKey>,
    ) -> std::result::Result<ModuleKey, ScriptError> {
        if spec.trim().is_empty() {
            return Err(ScriptError::InvalidSpecifier {
                spec: spec.to_string(),
                reason: "specifier is empty".to_string(),
            });
        }

        let relative = spec.starts_with("./") || spec.starts_with("../");
        let path = Path::new(spec);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else if relative {
            let base = referrer
                .and_then(|key| Path::new(key.as_str()).parent())
                .unwrap_or(self.root.as_path());
            base.join(path)
        } else {
            self.root.join(path)
        };

        let mut resolved = normalize(&joined);
        if resolved.extension().is_none() && !self.extension.is_empty() {
            resolved.set_extension(&self.extension);
        }

        Ok(ModuleKey::new(resolved.to_string_lossy().into_owned()))
    }

    fn target_of(&self, key: &ModuleKey, spec: &str) -> Result<ModuleKey> {
        self.resolve_spec(spec, Some(key))
            .with_context(|| format!("resolving '{spec}' from {key}"))
    }

    fn print(&self, line: String) {
        self.output.lock().push(line);
    }
}

#[async_trait]
impl LoaderHooks for ScriptHooks {
    type Source = String;
    type Record = ScriptRecord;
    type Namespace = ScriptNamespace;
    type Params = ();
    type Fetcher = ();

    async fn resolve(
        &self,
        name: &str,
        referrer: Option<&ModuleKey>,
        _fetcher: &(),
    ) -> Result<ModuleKey> {
        Ok(self.resolve_spec(name, referrer)?)
    }

    fn resolve_sync(&self, name: &str, referrer: &ModuleKey, _fetcher: &()) -> Result<ModuleKey> {
        Ok(self.resolve_spec(name, Some(referrer))?)
    }

    async fn fetch(
        &self,
        key: &ModuleKey,
        _params: Option<&()>,
        _fetcher: &(),
    ) -> Result<String> {
        let registered = self.sources.lock().get(key).cloned();
        if let Some(source) = registered {
            return Ok(source);
        }

        debug!(%key, "reading module from disk");
        tokio::fs::read_to_string(key.as_str())
            .await
            .with_context(|| format!("reading {key}"))
    }

    fn parse_module(&self, key: &ModuleKey, source: &String) -> Result<ScriptRecord> {
        let module = ScriptModule::parse(source)?;
        self.bindings
            .lock()
            .modules
            .insert(key.clone(), module.clone());
        Ok(ScriptRecord {
            key: key.clone(),
            module,
        })
    }

    fn requested_modules(&self, record: &ScriptRecord) -> Vec<String> {
        record.module.requested_modules().to_vec()
    }

    fn module_declaration_instantiation(
        &self,
        record: &ScriptRecord,
        key: &ModuleKey,
        _fetcher: &(),
    ) -> Result<()> {
        let mut imports = HashMap::new();
        let mut forwards = HashMap::new();

        let mut state = self.bindings.lock();
        for (name, spec) in record.module.import_bindings() {
            let owner = self.target_of(key, spec)?;
            check_declared(&state, &owner, name)?;
            imports.insert(name.to_string(), owner);
        }
        for (name, spec) in record.module.re_exports() {
            let owner = self.target_of(key, spec)?;
            check_declared(&state, &owner, name)?;
            forwards.insert(name.to_string(), owner);
        }

        state.imports.insert(key.clone(), imports);
        state.forwards.insert(key.clone(), forwards);
        Ok(())
    }

    async fn evaluate(&self, key: &ModuleKey, record: &ScriptRecord, _fetcher: &()) -> Result<()> {
        for statement in record.module.statements() {
            match statement {
                Statement::Import { .. } | Statement::ReExport { .. } => {}
                Statement::Export { name, value } => {
                    self.bindings
                        .lock()
                        .values
                        .entry(key.clone())
                        .or_default()
                        .insert(name.clone(), value.clone());
                }
                Statement::Print(PrintArg::Text(text)) => self.print(text.clone()),
                Statement::Print(PrintArg::Binding(name)) => {
                    let value = {
                        let state = self.bindings.lock();
                        match state.imports.get(key).and_then(|imports| imports.get(name)) {
                            Some(owner) => state.lookup(owner, name),
                            None => state.lookup(key, name),
                        }
                    };
                    self.print(match value {
                        Some(Value::String(text)) => text,
                        Some(other) => other.to_string(),
                        None => UNINITIALIZED.to_string(),
                    });
                }
                Statement::Fail(message) => bail!("{message}"),
            }
        }
        Ok(())
    }

    fn namespace_object(&self, record: &ScriptRecord) -> ScriptNamespace {
        let state = self.bindings.lock();
        record
            .module
            .exports()
            .iter()
            .map(|name| {
                let value = state.lookup(&record.key, name).unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }
}

fn check_declared(state: &BindingState, owner: &ModuleKey, name: &str) -> Result<()> {
    match state.modules.get(owner) {
        Some(module) if module.declares_export(name) => Ok(()),
        Some(_) => bail!("module {owner} has no export named '{name}'"),
        None => bail!("module {owner} is not instantiated"),
    }
}

/// Lexically removes `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // Only a named component can absorb `..`; a leading `..` is kept.
            Component::ParentDir => {
                let last = normalized.components().next_back();
                let named = matches!(last, Some(Component::Normal(_)));
                let at_root = matches!(last, Some(Component::RootDir | Component::Prefix(_)));
                if named {
                    normalized.pop();
                } else if !at_root {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_referrer() {
        let hooks = ScriptHooks::new("/app");
        let referrer = ModuleKey::from("/app/lib/main.mod");

        assert_eq!(
            hooks.resolve_spec("./util", Some(&referrer)).unwrap(),
            ModuleKey::from("/app/lib/util.mod")
        );
        assert_eq!(
            hooks.resolve_spec("../shared/x.mod", Some(&referrer)).unwrap(),
            ModuleKey::from("/app/shared/x.mod")
        );
        assert_eq!(
            hooks.resolve_spec("vendor/y", Some(&referrer)).unwrap(),
            ModuleKey::from("/app/vendor/y.mod")
        );
        assert_eq!(
            hooks.resolve_spec("/abs/z.txt", None).unwrap(),
            ModuleKey::from("/abs/z.txt")
        );
    }

    #[test]
    fn test_resolve_top_level_uses_root() {
        let hooks = ScriptHooks::new("/app/./src").with_extension(".js");
        assert_eq!(
            hooks.resolve_spec("./main", None).unwrap(),
            ModuleKey::from("/app/src/main.js")
        );
        assert!(hooks.resolve_spec("  ", None).is_err());
    }

    #[test]
    fn test_with_source_rejects_empty_specifier() {
        let err = ScriptHooks::new("/app").with_source(" ", "print hi").err();
        assert!(matches!(err, Some(ScriptError::InvalidSpecifier { .. })));

        let hooks = ScriptHooks::new("/app").with_source("main", "print hi").unwrap();
        assert!(hooks
            .sources
            .lock()
            .contains_key(&ModuleKey::from("/app/main.mod")));
    }

    #[test]
    fn test_normalize_keeps_leading_parent_dirs() {
        assert_eq!(normalize(Path::new("../a/./b/../c")), PathBuf::from("../a/c"));
        assert_eq!(normalize(Path::new("/x/y/../../z")), PathBuf::from("/z"));
        assert_eq!(normalize(Path::new("../lib/../../y.mod")), PathBuf::from("../../y.mod"));
        assert_eq!(normalize(Path::new("../../a/..")), PathBuf::from("../.."));
        assert_eq!(normalize(Path::new("/../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_parent_specifiers_escaping_relative_root_stay_distinct() {
        let hooks = ScriptHooks::new(".");
        let referrer = hooks.resolve_spec("../lib/x", None).unwrap();
        assert_eq!(referrer, ModuleKey::from("../lib/x.mod"));

        let outer = hooks.resolve_spec("../../y", Some(&referrer)).unwrap();
        let inner = hooks.resolve_spec("y", None).unwrap();
        assert_eq!(outer, ModuleKey::from("../../y.mod"));
        assert_ne!(outer, inner);
    }
}
