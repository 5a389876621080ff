//! Per-round overlay over the graph.
//!
//! A [`Delta`] records which sources were compiled (`base_sources`) or
//! deleted in a round, the nodes those sources had in the graph before the
//! round, and the nodes the front end produced for them. It is created fresh
//! for every round and discarded once the round is committed.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::Graph;
use crate::types::{JvmClass, NodeSource, ReferenceId};

/// Nodes before and after one compilation round.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    base_sources: BTreeSet<NodeSource>,
    deleted_sources: BTreeSet<NodeSource>,
    past: BTreeMap<NodeSource, Vec<JvmClass>>,
    now: BTreeMap<NodeSource, Vec<JvmClass>>,
    /// Id -> sources defining it after the round.
    now_sources: BTreeMap<ReferenceId, BTreeSet<NodeSource>>,
    source_only: bool,
}

impl Delta {
    /// Start a round that compiles `base_sources` and deletes `deleted_sources`.
    ///
    /// The past side is snapshotted from the graph. Sources listed as both
    /// compiled and deleted count as deleted.
    pub fn new(
        graph: &Graph,
        base_sources: impl IntoIterator<Item = NodeSource>,
        deleted_sources: impl IntoIterator<Item = NodeSource>,
    ) -> Self {
        let deleted_sources: BTreeSet<NodeSource> = deleted_sources.into_iter().collect();
        let base_sources: BTreeSet<NodeSource> = base_sources
            .into_iter()
            .filter(|s| !deleted_sources.contains(s))
            .collect();
        let past = base_sources
            .iter()
            .chain(&deleted_sources)
            .map(|s| (s.clone(), graph.nodes_of_source(s).to_vec()))
            .collect();

        Self {
            base_sources,
            deleted_sources,
            past,
            ..Self::default()
        }
    }

    /// Start a source-only round: the sources are re-examined without new bytecode.
    pub fn source_only(graph: &Graph, base_sources: impl IntoIterator<Item = NodeSource>) -> Self {
        let mut delta = Self::new(graph, base_sources, Vec::new());
        delta.source_only = true;
        delta
    }

    /// Record the nodes the front end produced for a source.
    ///
    /// A source not yet part of the round joins `base_sources`, and its past
    /// side is snapshotted from `graph` so removals from it are still seen.
    pub fn associate(&mut self, graph: &Graph, source: NodeSource, nodes: Vec<JvmClass>) {
        if !self.base_sources.contains(&source) {
            self.base_sources.insert(source.clone());
            self.past
                .entry(source.clone())
                .or_insert_with(|| graph.nodes_of_source(&source).to_vec());
        }
        if let Some(previous) = self.now.get(&source) {
            for node in previous {
                if let Some(sources) = self.now_sources.get_mut(&node.id) {
                    sources.remove(&source);
                }
            }
        }
        for node in &nodes {
            self.now_sources
                .entry(node.id.clone())
                .or_default()
                .insert(source.clone());
        }
        self.now.insert(source, nodes);
    }

    /// The round has no class changes.
    pub fn is_source_only(&self) -> bool {
        self.source_only
    }

    /// Sources compiled in this round.
    pub fn base_sources(&self) -> &BTreeSet<NodeSource> {
        &self.base_sources
    }

    /// Sources deleted in this round.
    pub fn deleted_sources(&self) -> &BTreeSet<NodeSource> {
        &self.deleted_sources
    }

    /// Source was compiled in this round.
    pub fn is_compiled(&self, source: &NodeSource) -> bool {
        self.base_sources.contains(source)
    }

    /// Source was deleted in this round.
    pub fn is_deleted(&self, source: &NodeSource) -> bool {
        self.deleted_sources.contains(source)
    }

    /// Nodes of compiled and deleted sources before the round.
    pub fn nodes_before(&self) -> impl Iterator<Item = &JvmClass> {
        self.past.values().flatten()
    }

    /// Nodes produced in this round.
    pub fn nodes_after(&self) -> impl Iterator<Item = &JvmClass> {
        self.now.values().flatten()
    }

    /// Nodes produced in this round with their defining source.
    pub fn nodes_after_by_source(&self) -> impl Iterator<Item = (&NodeSource, &JvmClass)> {
        self.now
            .iter()
            .flat_map(|(s, nodes)| nodes.iter().map(move |n| (s, n)))
    }

    /// Nodes a source had before the round.
    pub fn nodes_before_of(&self, source: &NodeSource) -> &[JvmClass] {
        self.past.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes a source has after the round.
    pub fn nodes_after_of(&self, source: &NodeSource) -> &[JvmClass] {
        self.now.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sources defining the id after the round.
    pub fn sources_after(&self, id: &ReferenceId) -> impl Iterator<Item = &NodeSource> {
        self.now_sources.get(id).into_iter().flatten()
    }

    /// Nothing compiled and nothing deleted.
    pub fn is_empty(&self) -> bool {
        self.base_sources.is_empty() && self.deleted_sources.is_empty()
    }
}
