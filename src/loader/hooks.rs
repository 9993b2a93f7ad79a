//! Host-provided capabilities the pipeline drives

use crate::loader::registry::ModuleKey;
use anyhow::Result;
use async_trait::async_trait;

/// Capabilities supplied by the embedding host.
///
/// The loader owns ordering, memoization and failure caching; everything that
/// produces content (resolving names, reading source, parsing, binding and
/// running module bodies) happens behind this trait. Hook errors are rendered
/// into the matching [`LoaderError`](crate::loader::LoaderError) variant.
///
/// The loader never holds its registry lock while a hook runs, so hooks may
/// call back into the loader (for example to [`provide_fetch`] a dependency).
///
/// [`provide_fetch`]: crate::loader::ModuleLoader::provide_fetch
#[async_trait]
pub trait LoaderHooks: Send + Sync + 'static {
    /// Raw module content returned by [`fetch`](LoaderHooks::fetch).
    type Source: Clone + Send + Sync + 'static;
    /// Parsed module representation.
    type Record: Send + Sync + 'static;
    /// Caller-facing view of a module's bindings.
    type Namespace: Send + 'static;
    /// Per-request fetch parameters. Only top-level requests carry them.
    type Params: Clone + Send + Sync + 'static;
    /// Opaque context identifying who initiated a request.
    type Fetcher: Clone + Send + Sync + 'static;

    /// Maps a top-level module name to its canonical key.
    async fn resolve(
        &self,
        name: &str,
        referrer: Option<&ModuleKey>,
        fetcher: &Self::Fetcher,
    ) -> Result<ModuleKey>;

    /// Maps a dependency name to its canonical key. Must not block.
    fn resolve_sync(
        &self,
        name: &str,
        referrer: &ModuleKey,
        fetcher: &Self::Fetcher,
    ) -> Result<ModuleKey>;

    /// Retrieves the raw content for `key`.
    async fn fetch(
        &self,
        key: &ModuleKey,
        params: Option<&Self::Params>,
        fetcher: &Self::Fetcher,
    ) -> Result<Self::Source>;

    /// Parses source into a module record.
    fn parse_module(&self, key: &ModuleKey, source: &Self::Source) -> Result<Self::Record>;

    /// Dependency names requested by `record`, in declaration order.
    fn requested_modules(&self, record: &Self::Record) -> Vec<String>;

    /// Binds the imports and exports of one module.
    fn module_declaration_instantiation(
        &self,
        record: &Self::Record,
        key: &ModuleKey,
        fetcher: &Self::Fetcher,
    ) -> Result<()>;

    /// Runs one module body.
    async fn evaluate(
        &self,
        key: &ModuleKey,
        record: &Self::Record,
        fetcher: &Self::Fetcher,
    ) -> Result<()>;

    /// Namespace view of a module record.
    fn namespace_object(&self, record: &Self::Record) -> Self::Namespace;
}
