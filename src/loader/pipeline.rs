//! Module loader: owns the registry and composes the pipeline stages

use crate::loader::error::{LoaderError, Result};
use crate::loader::hooks::LoaderHooks;
use crate::loader::registry::{EntryId, EntrySnapshot, ModuleKey, Registry};
use crate::loader::state::{ModuleState, PhaseSlot};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Entries whose satisfaction was requested during one top-level request.
///
/// A dependency found in this set is on the active resolution path (or was
/// reached through another branch of the same request), so the satisfy stage
/// waits only for its instantiation instead of its full satisfaction.
#[derive(Debug, Clone, Default)]
pub struct VisitedSet(Arc<Mutex<HashSet<EntryId>>>);

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: EntryId) -> bool {
        self.0.lock().insert(id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.0.lock().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Drives modules through fetch, instantiate, satisfy, link and evaluation.
///
/// Cloning is cheap; clones share the same registry and hooks.
pub struct ModuleLoader<H: LoaderHooks> {
    pub(crate) hooks: Arc<H>,
    pub(crate) registry: Arc<Mutex<Registry<H>>>,
    pub(crate) fetch_timeout: Option<Duration>,
}

impl<H: LoaderHooks> Clone for ModuleLoader<H> {
    fn clone(&self) -> Self {
        Self {
            hooks: Arc::clone(&self.hooks),
            registry: Arc::clone(&self.registry),
            fetch_timeout: self.fetch_timeout,
        }
    }
}

impl<H: LoaderHooks> ModuleLoader<H> {
    pub fn new(hooks: H) -> Self {
        Self::with_hooks(Arc::new(hooks))
    }

    pub fn with_hooks(hooks: Arc<H>) -> Self {
        Self {
            hooks,
            registry: Arc::new(Mutex::new(Registry::new())),
            fetch_timeout: None,
        }
    }

    /// Bounds every fetch attempt. A timed-out attempt fails like any other
    /// fetch failure and is retried by the next request.
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn hooks(&self) -> &Arc<H> {
        &self.hooks
    }

    /// Returns the entry for `key`, registering it on first use.
    pub fn ensure_registered(&self, key: &ModuleKey) -> EntryId {
        self.registry.lock().ensure_registered(key)
    }

    /// Runs `f` against the registry. The hooks must not be called from `f`.
    pub fn with_registry<R>(&self, f: impl FnOnce(&Registry<H>) -> R) -> R {
        f(&self.registry.lock())
    }

    pub fn state(&self, key: &ModuleKey) -> Option<ModuleState> {
        self.with_registry(|registry| registry.get(key).map(|entry| entry.state()))
    }

    pub fn entry_snapshot(&self, key: &ModuleKey) -> Option<EntrySnapshot> {
        self.with_registry(|registry| registry.lookup(key).map(|id| registry.snapshot(id)))
    }

    /// Snapshots of every entry in registration order.
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.with_registry(|registry| {
            registry
                .iter()
                .map(|(id, _)| registry.snapshot(id))
                .collect()
        })
    }

    pub fn cycles(&self) -> Vec<Vec<ModuleKey>> {
        self.with_registry(|registry| registry.cycles())
    }

    pub(crate) fn key_of(&self, id: EntryId) -> ModuleKey {
        self.registry.lock().entry(id).key().clone()
    }

    /// Supplies the source for `key` directly, bypassing the fetch hook.
    ///
    /// Callers already waiting on an in-flight fetch of `key` receive `source`.
    /// Fails once the entry has moved past the fetch state.
    pub fn provide_fetch(&self, key: &ModuleKey, source: H::Source) -> Result<()> {
        let mut registry = self.registry.lock();
        let id = registry.ensure_registered(key);
        let entry = registry.entry_mut(id);

        if entry.state > ModuleState::Fetch {
            return Err(LoaderError::usage(
                key,
                "requested module is already fetched",
            ));
        }

        if let Some(waiters) = entry.fetch_override.take() {
            // The in-flight attempt may already be finishing; the slot below
            // is authoritative either way.
            let _ = waiters.send(source.clone());
        }
        entry.fetch = PhaseSlot::Done(Ok(source));
        entry.raise_state(ModuleState::Instantiate);
        debug!(%key, "module source provided");

        Ok(())
    }

    /// Resolves `name` and satisfies the whole graph reachable from it.
    pub async fn load_module(
        &self,
        name: &str,
        params: Option<H::Params>,
        fetcher: H::Fetcher,
    ) -> Result<ModuleKey> {
        let request_id = Uuid::new_v4();
        let span = info_span!("load_module", %request_id, name);

        async move {
            let key = self.resolve_top_level(name, &fetcher).await?;
            let id = self.ensure_registered(&key);
            self.request_satisfy(id, params, fetcher, VisitedSet::new())
                .await?;
            info!(%key, "module graph satisfied");
            Ok(key)
        }
        .instrument(span)
        .await
    }

    /// Links and evaluates an already satisfied module.
    ///
    /// Fails without side effects if the module has not reached the link state.
    pub async fn link_and_evaluate_module(
        &self,
        key: &ModuleKey,
        fetcher: H::Fetcher,
    ) -> Result<()> {
        let id = {
            let registry = self.registry.lock();
            let id = registry.lookup(key).ok_or_else(|| {
                LoaderError::usage(key, "requested module is not registered")
            })?;
            if registry.entry(id).state() < ModuleState::Link {
                return Err(LoaderError::usage(
                    key,
                    "requested module is not instantiated yet",
                ));
            }
            id
        };

        self.link(id, &fetcher)?;
        self.module_evaluation(id, fetcher).await
    }

    pub async fn load_and_evaluate_module(
        &self,
        name: &str,
        params: Option<H::Params>,
        fetcher: H::Fetcher,
    ) -> Result<()> {
        let key = self.load_module(name, params, fetcher.clone()).await?;
        self.link_and_evaluate_module(&key, fetcher).await
    }

    /// Satisfies, links and evaluates `key`, then returns its namespace view.
    pub async fn request_import_module(
        &self,
        key: &ModuleKey,
        params: Option<H::Params>,
        fetcher: H::Fetcher,
    ) -> Result<H::Namespace> {
        let request_id = Uuid::new_v4();
        let span = info_span!("import_module", %request_id, %key);

        async move {
            let id = self.ensure_registered(key);
            self.request_satisfy(id, params, fetcher.clone(), VisitedSet::new())
                .await?;
            self.link_and_evaluate_module(key, fetcher).await?;

            let record = self.registry.lock().entry(id).record().cloned();
            let record = record.ok_or_else(|| {
                LoaderError::usage(key, "module has no record after instantiation")
            })?;
            Ok(self.hooks.namespace_object(&record))
        }
        .instrument(span)
        .await
    }

    async fn resolve_top_level(&self, name: &str, fetcher: &H::Fetcher) -> Result<ModuleKey> {
        self.hooks
            .resolve(name, None, fetcher)
            .await
            .map_err(|e| LoaderError::Resolve {
                name: name.to_string(),
                reason: format!("{e:#}"),
            })
    }
}
