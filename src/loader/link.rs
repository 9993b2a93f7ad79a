//! Link and evaluation passes over the instantiated graph

use crate::loader::error::{LoaderError, Result};
use crate::loader::hooks::LoaderHooks;
use crate::loader::pipeline::ModuleLoader;
use crate::loader::registry::{EntryId, ModuleKey};
use crate::loader::state::{LinkOutcome, ModuleState};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, warn};

impl<H: LoaderHooks> ModuleLoader<H> {
    /// Links an entry and, depth first, everything it depends on.
    ///
    /// The entry is marked ready before its dependencies are visited, so a
    /// cycle back to it returns immediately. A failure is cached on the entry
    /// and re-raised by every later call without running the hook again.
    pub fn link(&self, id: EntryId, fetcher: &H::Fetcher) -> Result<()> {
        let (key, dependencies, record) = {
            let mut registry = self.registry.lock();
            let entry = registry.entry_mut(id);
            if let LinkOutcome::Failed(err) = &entry.link {
                return Err(err.clone());
            }
            if entry.state == ModuleState::Ready {
                return Ok(());
            }
            entry.raise_state(ModuleState::Ready);
            (
                entry.key.clone(),
                entry.dependencies.clone(),
                entry.record.clone(),
            )
        };

        let result = self.link_declarations(&key, &dependencies, record, fetcher);

        let mut registry = self.registry.lock();
        let entry = registry.entry_mut(id);
        match &result {
            Ok(()) => entry.link = LinkOutcome::Succeeded,
            Err(err) => {
                warn!(%key, error = %err, "module link failed");
                entry.link = LinkOutcome::Failed(err.clone());
            }
        }
        result
    }

    fn link_declarations(
        &self,
        key: &ModuleKey,
        dependencies: &[EntryId],
        record: Option<Arc<H::Record>>,
        fetcher: &H::Fetcher,
    ) -> Result<()> {
        for dep in dependencies {
            self.link(*dep, fetcher)?;
        }

        let record = record
            .ok_or_else(|| LoaderError::usage(key, "module is linked before it was instantiated"))?;
        self.hooks
            .module_declaration_instantiation(&record, key, fetcher)
            .map_err(|e| LoaderError::link(key, &e))
    }

    /// Evaluates an entry's dependencies in declaration order, then the entry.
    ///
    /// Each body runs at most once. The entry is marked evaluated before its
    /// dependencies are visited, so a module reached again through a cycle
    /// is skipped and its importer observes whatever it has assigned so far.
    pub fn module_evaluation(
        &self,
        id: EntryId,
        fetcher: H::Fetcher,
    ) -> BoxFuture<'static, Result<()>> {
        let this = self.clone();

        async move {
            let (key, dependencies, record) = {
                let mut registry = this.registry.lock();
                let entry = registry.entry_mut(id);
                if entry.evaluated {
                    return Ok(());
                }
                entry.evaluated = true;
                (
                    entry.key.clone(),
                    entry.dependencies.clone(),
                    entry.record.clone(),
                )
            };

            for dep in dependencies {
                this.module_evaluation(dep, fetcher.clone()).await?;
            }

            let record = record.ok_or_else(|| {
                LoaderError::usage(&key, "module is evaluated before it was instantiated")
            })?;
            debug!(%key, "evaluating module");
            this.hooks
                .evaluate(&key, &record, &fetcher)
                .await
                .map_err(|e| LoaderError::evaluate(&key, &e))
        }
        .boxed()
    }
}
