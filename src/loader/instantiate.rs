//! Instantiate stage: parse once, expand dependencies into registry entries

use crate::loader::error::{LoaderError, Result};
use crate::loader::hooks::LoaderHooks;
use crate::loader::pipeline::ModuleLoader;
use crate::loader::registry::EntryId;
use crate::loader::state::{ModuleState, PhaseFuture, PhaseSlot};
use futures::channel::oneshot;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

enum Claim {
    Joined(PhaseFuture<EntryId>),
    Settled(Result<EntryId>),
    Claimed {
        attempt: u64,
        done: oneshot::Sender<Result<EntryId>>,
    },
}

impl<H: LoaderHooks> ModuleLoader<H> {
    /// Requests the module record of an entry.
    ///
    /// Fetch failures pass through without being cached here, so a later
    /// request can retry the fetch. Once source is available, the outcome of
    /// parsing and dependency resolution is cached permanently.
    pub fn request_instantiate(
        &self,
        id: EntryId,
        params: Option<H::Params>,
        fetcher: H::Fetcher,
    ) -> BoxFuture<'static, Result<EntryId>> {
        {
            let registry = self.registry.lock();
            match &registry.entry(id).instantiate {
                PhaseSlot::InFlight { future, .. } => return future.clone().boxed(),
                PhaseSlot::Done(result) => return future::ready(result.clone()).boxed(),
                PhaseSlot::NotStarted => {}
            }
        }

        let fetch = self.request_fetch(id, params, fetcher.clone());
        let this = self.clone();

        async move {
            let source = fetch.await?;

            // Another request may have claimed instantiation while this one
            // was waiting for the source.
            let (attempt, done) = match this.claim_instantiation(id) {
                Claim::Joined(pending) => return pending.await,
                Claim::Settled(result) => return result,
                Claim::Claimed { attempt, done } => (attempt, done),
            };

            let result = this.instantiate_entry(id, &source, &fetcher);

            {
                let mut registry = this.registry.lock();
                registry
                    .entry_mut(id)
                    .instantiate
                    .settle(attempt, result.clone());
            }
            let _ = done.send(result.clone());
            result
        }
        .boxed()
    }

    fn claim_instantiation(&self, id: EntryId) -> Claim {
        let mut registry = self.registry.lock();
        let entry = registry.entry_mut(id);

        match &entry.instantiate {
            PhaseSlot::InFlight { future, .. } => Claim::Joined(future.clone()),
            PhaseSlot::Done(result) => Claim::Settled(result.clone()),
            PhaseSlot::NotStarted => {
                let (done, pending) = oneshot::channel::<Result<EntryId>>();
                let key = entry.key.clone();
                let future = pending
                    .map(move |received| {
                        received.unwrap_or_else(|_| {
                            Err(LoaderError::Instantiate {
                                key: key.to_string(),
                                reason: "instantiation was abandoned".to_string(),
                            })
                        })
                    })
                    .boxed()
                    .shared();

                let attempt = entry.next_attempt();
                entry.instantiate = PhaseSlot::InFlight { attempt, future };
                Claim::Claimed { attempt, done }
            }
        }
    }

    /// Parses the source and registers every requested dependency in
    /// declaration order. Runs without suspending.
    fn instantiate_entry(
        &self,
        id: EntryId,
        source: &H::Source,
        fetcher: &H::Fetcher,
    ) -> Result<EntryId> {
        let key = self.key_of(id);

        let record = self
            .hooks
            .parse_module(&key, source)
            .map_err(|e| LoaderError::instantiate(&key, &e))?;
        let requested = self.hooks.requested_modules(&record);

        let mut dependencies = Vec::with_capacity(requested.len());
        let mut dependencies_by_name = HashMap::with_capacity(requested.len());
        for name in requested {
            let dep_key = self
                .hooks
                .resolve_sync(&name, &key, fetcher)
                .map_err(|e| {
                    LoaderError::instantiate(&key, &e.context(format!("cannot resolve '{name}'")))
                })?;
            let dep = self.ensure_registered(&dep_key);
            dependencies.push(dep);
            dependencies_by_name.insert(name, dep);
        }

        debug!(%key, dependencies = dependencies.len(), "module instantiated");

        let mut registry = self.registry.lock();
        let entry = registry.entry_mut(id);
        entry.dependencies = dependencies;
        entry.dependencies_by_name = dependencies_by_name;
        entry.record = Some(Arc::new(record));
        entry.raise_state(ModuleState::Satisfy);

        Ok(id)
    }
}
