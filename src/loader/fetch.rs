//! Fetch stage: retry until the first success, then cache permanently

use crate::loader::error::{LoaderError, Result};
use crate::loader::hooks::LoaderHooks;
use crate::loader::pipeline::ModuleLoader;
use crate::loader::registry::EntryId;
use crate::loader::state::{ModuleState, PhaseSlot};
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, Either};
use futures::FutureExt;
use tracing::{debug, warn};

impl<H: LoaderHooks> ModuleLoader<H> {
    /// Requests the source of an entry.
    ///
    /// A successful fetch is cached for the entry's lifetime. While the entry
    /// is still in the fetch state, a failed attempt is forgotten and the next
    /// request (or a caller that joined the failing attempt) starts a new one
    /// with its own parameters.
    pub fn request_fetch(
        &self,
        id: EntryId,
        params: Option<H::Params>,
        fetcher: H::Fetcher,
    ) -> BoxFuture<'static, Result<H::Source>> {
        let mut registry = self.registry.lock();
        let entry = registry.entry_mut(id);

        match &entry.fetch {
            PhaseSlot::Done(Ok(source)) => return future::ready(Ok(source.clone())).boxed(),
            PhaseSlot::Done(Err(err)) if entry.state > ModuleState::Fetch => {
                return future::ready(Err(err.clone())).boxed();
            }
            PhaseSlot::Done(Err(err)) => {
                debug!(key = %entry.key, error = %err, "retrying failed fetch");
                entry.fetch = PhaseSlot::NotStarted;
            }
            PhaseSlot::InFlight { future, .. } if entry.state > ModuleState::Fetch => {
                return future.clone().boxed();
            }
            PhaseSlot::InFlight { future, .. } => {
                // Join the outstanding attempt; if it fails, go through the
                // slot again so a newer attempt is joined rather than duplicated.
                let current = future.clone();
                let this = self.clone();
                return async move {
                    match current.await {
                        Ok(source) => Ok(source),
                        Err(_) => this.request_fetch(id, params, fetcher).await,
                    }
                }
                .boxed();
            }
            PhaseSlot::NotStarted => {}
        }

        let attempt = entry.next_attempt();
        let key = entry.key.clone();
        let (override_tx, override_rx) = oneshot::channel::<H::Source>();
        let this = self.clone();

        let attempt_future = async move {
            debug!(%key, attempt, "fetching module");
            let hooks = this.hooks.clone();
            let timeout = this.fetch_timeout;
            let hook_key = key.clone();
            let fetch = async move {
                let fetched = hooks.fetch(&hook_key, params.as_ref(), &fetcher);
                let fetched = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, fetched).await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!("fetch timed out after {limit:?}")),
                    },
                    None => fetched.await,
                };
                fetched.map_err(|e| LoaderError::fetch(&hook_key, &e))
            }
            .boxed();

            let outcome = match future::select(fetch, override_rx).await {
                Either::Left((result, _)) => result,
                Either::Right((Ok(provided), _)) => Ok(provided),
                Either::Right((Err(_), fetch)) => fetch.await,
            };

            {
                let mut registry = this.registry.lock();
                let entry = registry.entry_mut(id);
                if outcome.is_ok() {
                    entry.raise_state(ModuleState::Instantiate);
                }
                if entry.fetch.settle(attempt, outcome.clone()) {
                    entry.fetch_override = None;
                }
            }

            if let Err(err) = &outcome {
                warn!(%key, attempt, error = %err, "module fetch failed");
            }
            outcome
        }
        .boxed()
        .shared();

        entry.fetch = PhaseSlot::InFlight {
            attempt,
            future: attempt_future.clone(),
        };
        entry.fetch_override = Some(override_tx);

        attempt_future.boxed()
    }
}
