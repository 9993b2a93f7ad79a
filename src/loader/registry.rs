//! Registry of module entries, the single authority for module identity

use crate::loader::hooks::LoaderHooks;
use crate::loader::state::{LinkOutcome, ModuleState, PhaseSlot, SlotStatus};
use futures::channel::oneshot;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Canonical module identifier produced by resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleKey(String);

impl ModuleKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ModuleKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Stable handle of an entry, assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(usize);

impl EntryId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-module state record.
pub struct Entry<H: LoaderHooks> {
    pub(crate) key: ModuleKey,
    pub(crate) state: ModuleState,
    pub(crate) fetch: PhaseSlot<H::Source>,
    pub(crate) fetch_override: Option<oneshot::Sender<H::Source>>,
    pub(crate) instantiate: PhaseSlot<EntryId>,
    pub(crate) satisfy: PhaseSlot<EntryId>,
    pub(crate) dependencies: Vec<EntryId>,
    pub(crate) dependencies_by_name: HashMap<String, EntryId>,
    pub(crate) record: Option<Arc<H::Record>>,
    pub(crate) link: LinkOutcome,
    pub(crate) evaluated: bool,
    next_attempt: u64,
}

impl<H: LoaderHooks> Entry<H> {
    fn new(key: ModuleKey) -> Self {
        Self {
            key,
            state: ModuleState::Fetch,
            fetch: PhaseSlot::NotStarted,
            fetch_override: None,
            instantiate: PhaseSlot::NotStarted,
            satisfy: PhaseSlot::NotStarted,
            dependencies: Vec::new(),
            dependencies_by_name: HashMap::new(),
            record: None,
            link: LinkOutcome::NotAttempted,
            evaluated: false,
            next_attempt: 0,
        }
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Dependencies in declaration order. Empty until instantiation completes.
    pub fn dependencies(&self) -> &[EntryId] {
        &self.dependencies
    }

    /// Entry a declared dependency name was resolved to.
    pub fn dependency(&self, name: &str) -> Option<EntryId> {
        self.dependencies_by_name.get(name).copied()
    }

    pub fn record(&self) -> Option<&Arc<H::Record>> {
        self.record.as_ref()
    }

    pub fn link_outcome(&self) -> &LinkOutcome {
        &self.link
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    pub fn fetch_status(&self) -> SlotStatus {
        self.fetch.status()
    }

    pub fn instantiate_status(&self) -> SlotStatus {
        self.instantiate.status()
    }

    pub fn satisfy_status(&self) -> SlotStatus {
        self.satisfy.status()
    }

    pub(crate) fn raise_state(&mut self, target: ModuleState) {
        self.state.raise_to(target);
    }

    pub(crate) fn next_attempt(&mut self) -> u64 {
        self.next_attempt += 1;
        self.next_attempt
    }
}

/// Serializable view of an entry for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub key: ModuleKey,
    pub state: ModuleState,
    pub fetch: SlotStatus,
    pub instantiate: SlotStatus,
    pub satisfy: SlotStatus,
    pub dependencies: Vec<ModuleKey>,
    pub link: LinkStatus,
    pub link_error: Option<String>,
    pub evaluated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkStatus {
    NotAttempted,
    Succeeded,
    Failed,
}

/// Key to entry mapping. Entries are stored in an arena and never removed,
/// so an [`EntryId`] stays valid for the registry's lifetime.
pub struct Registry<H: LoaderHooks> {
    entries: Vec<Entry<H>>,
    index: HashMap<ModuleKey, EntryId>,
}

impl<H: LoaderHooks> Registry<H> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the entry for `key`, creating it in the `Fetch` state on first use.
    pub fn ensure_registered(&mut self, key: &ModuleKey) -> EntryId {
        if let Some(id) = self.index.get(key) {
            return *id;
        }

        let id = EntryId(self.entries.len());
        self.entries.push(Entry::new(key.clone()));
        self.index.insert(key.clone(), id);
        id
    }

    pub fn lookup(&self, key: &ModuleKey) -> Option<EntryId> {
        self.index.get(key).copied()
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    pub fn entry(&self, id: EntryId) -> &Entry<H> {
        &self.entries[id.0]
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> &mut Entry<H> {
        &mut self.entries[id.0]
    }

    pub fn get(&self, key: &ModuleKey) -> Option<&Entry<H>> {
        self.lookup(key).map(|id| self.entry(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry<H>)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (EntryId(index), entry))
    }

    pub fn snapshot(&self, id: EntryId) -> EntrySnapshot {
        let entry = self.entry(id);
        let (link, link_error) = match &entry.link {
            LinkOutcome::NotAttempted => (LinkStatus::NotAttempted, None),
            LinkOutcome::Succeeded => (LinkStatus::Succeeded, None),
            LinkOutcome::Failed(err) => (LinkStatus::Failed, Some(err.to_string())),
        };

        EntrySnapshot {
            key: entry.key.clone(),
            state: entry.state,
            fetch: entry.fetch.status(),
            instantiate: entry.instantiate.status(),
            satisfy: entry.satisfy.status(),
            dependencies: entry
                .dependencies
                .iter()
                .map(|dep| self.entry(*dep).key.clone())
                .collect(),
            link,
            link_error,
            evaluated: entry.evaluated,
        }
    }

    /// Dependency graph over every registered entry. Node indices match
    /// registration order; edges follow declaration order.
    pub fn dependency_graph(&self) -> DiGraph<ModuleKey, ()> {
        let mut graph = DiGraph::with_capacity(self.entries.len(), 0);
        for entry in &self.entries {
            graph.add_node(entry.key.clone());
        }
        for (index, entry) in self.entries.iter().enumerate() {
            for dep in &entry.dependencies {
                graph.add_edge(NodeIndex::new(index), NodeIndex::new(dep.0), ());
            }
        }
        graph
    }

    /// Groups of mutually dependent modules, each ordered by registration.
    pub fn cycles(&self) -> Vec<Vec<ModuleKey>> {
        let graph = self.dependency_graph();
        let mut cycles: Vec<Vec<NodeIndex>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || graph.contains_edge(component[0], component[0])
            })
            .map(|mut component| {
                component.sort();
                component
            })
            .collect();
        cycles.sort();

        cycles
            .into_iter()
            .map(|component| component.into_iter().map(|node| graph[node].clone()).collect())
            .collect()
    }
}

impl<H: LoaderHooks> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}
