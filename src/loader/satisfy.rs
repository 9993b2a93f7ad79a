//! Satisfy stage: instantiate the reachable graph without deadlocking on cycles

use crate::loader::error::{LoaderError, Result};
use crate::loader::hooks::LoaderHooks;
use crate::loader::pipeline::{ModuleLoader, VisitedSet};
use crate::loader::registry::EntryId;
use crate::loader::state::{ModuleState, PhaseSlot};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tracing::debug;

impl<H: LoaderHooks> ModuleLoader<H> {
    /// Requests that an entry and everything it depends on be instantiated.
    ///
    /// `visited` is scoped to one top-level request. A dependency already in
    /// it is only waited on until instantiated: waiting for its satisfaction
    /// would wait on an ancestor of this very request.
    pub fn request_satisfy(
        &self,
        id: EntryId,
        params: Option<H::Params>,
        fetcher: H::Fetcher,
        visited: VisitedSet,
    ) -> BoxFuture<'static, Result<EntryId>> {
        {
            let registry = self.registry.lock();
            match &registry.entry(id).satisfy {
                PhaseSlot::InFlight { future, .. } => return future.clone().boxed(),
                PhaseSlot::Done(result) => return future::ready(result.clone()).boxed(),
                PhaseSlot::NotStarted => {}
            }
        }

        visited.insert(id);
        let instantiate = self.request_instantiate(id, params, fetcher.clone());
        let this = self.clone();

        async move {
            instantiate.await?;

            let (key, dependencies) = {
                let registry = this.registry.lock();
                let entry = registry.entry(id);
                if let PhaseSlot::Done(result) = &entry.satisfy {
                    return result.clone();
                }
                (entry.key().clone(), entry.dependencies().to_vec())
            };

            // Dependencies never see the top-level request parameters.
            let loads = dependencies.iter().map(|dep| {
                if visited.contains(*dep) {
                    this.request_instantiate(*dep, None, fetcher.clone())
                } else {
                    this.request_satisfy(*dep, None, fetcher.clone(), visited.clone())
                }
            });
            let results = future::join_all(loads).await;

            // Report the first failure in declaration order.
            for (dep, result) in dependencies.iter().zip(results) {
                if let Err(err) = result {
                    let dep_key = this.key_of(*dep);
                    return Err(LoaderError::satisfy(&key, dep_key, err));
                }
            }

            let mut registry = this.registry.lock();
            let entry = registry.entry_mut(id);
            if !matches!(entry.satisfy, PhaseSlot::Done(Ok(_))) {
                entry.satisfy = PhaseSlot::Done(Ok(id));
                entry.raise_state(ModuleState::Link);
                debug!(%key, "module satisfied");
            }
            Ok(id)
        }
        .boxed()
    }
}
