//! Persistent dependency graph.
//!
//! The graph owns the committed nodes of every source and three reverse
//! indices over them: id to defining sources, usage owner to depending ids,
//! and short class name to ids. It is read-only during differentiation; the
//! driver commits a finished [`Delta`] with [`Graph::apply`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::to_canonical_bytes;
use crate::delta::Delta;
use crate::types::{JvmClass, NodeSource, ReferenceId};

/// Error type for graph persistence.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Persisted graph could not be decoded.
    #[error("Graph decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    /// Persisted graph is not the version this build reads.
    #[error("Unsupported graph version {found}, expected {expected}")]
    Version {
        /// Version found in the input.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },
}

/// Version of the persisted graph layout.
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// Persisted form: the node listing only.
#[derive(Serialize, Deserialize)]
struct GraphListing {
    version: u32,
    sources: BTreeMap<NodeSource, Vec<JvmClass>>,
}

/// Committed dependency graph.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    /// Nodes by defining source.
    sources: BTreeMap<NodeSource, Vec<JvmClass>>,
    /// Id -> defining sources.
    node_sources: BTreeMap<ReferenceId, BTreeSet<NodeSource>>,
    /// Usage owner -> ids of nodes using it.
    dependents: BTreeMap<ReferenceId, BTreeSet<ReferenceId>>,
    /// Short class name -> ids.
    short_names: BTreeMap<String, BTreeSet<ReferenceId>>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the nodes of a source.
    pub fn add_source(&mut self, source: NodeSource, nodes: Vec<JvmClass>) {
        self.remove_source(&source);
        self.sources.insert(source.clone(), nodes);
        self.index_source(&source);
    }

    /// Drop a source and its nodes.
    pub fn remove_source(&mut self, source: &NodeSource) {
        if let Some(nodes) = self.sources.remove(source) {
            self.unindex_source(source, &nodes);
        }
    }

    /// Commit a finished round.
    ///
    /// Deleted sources are dropped and every compiled source is replaced by
    /// the nodes the delta associated with it. A source-only delta carries no
    /// new nodes and leaves the graph untouched.
    pub fn apply(&mut self, delta: &Delta) {
        if delta.is_source_only() {
            return;
        }
        for source in delta.deleted_sources() {
            self.remove_source(source);
        }
        for source in delta.base_sources() {
            let nodes = delta.nodes_after_of(source).to_vec();
            if nodes.is_empty() {
                self.remove_source(source);
            } else {
                self.add_source(source.clone(), nodes);
            }
        }
        tracing::debug!(
            sources = self.sources.len(),
            nodes = self.node_sources.len(),
            "Applied delta to graph"
        );
    }

    fn rebuild_indices(&mut self) {
        self.node_sources.clear();
        self.dependents.clear();
        self.short_names.clear();
        let sources: Vec<NodeSource> = self.sources.keys().cloned().collect();
        for source in &sources {
            self.index_source(source);
        }
    }

    /// Add the index entries of a source already present in `sources`.
    fn index_source(&mut self, source: &NodeSource) {
        let Self { sources, node_sources, dependents, short_names } = self;
        for node in sources.get(source).into_iter().flatten() {
            node_sources.entry(node.id.clone()).or_default().insert(source.clone());
            short_names
                .entry(node.short_name().to_string())
                .or_default()
                .insert(node.id.clone());
            for usage in &node.usages {
                let owner = usage.element_owner();
                if owner != node.id {
                    dependents.entry(owner).or_default().insert(node.id.clone());
                }
            }
        }
    }

    /// Drop the index entries `nodes` contributed, once `source` is gone from
    /// `sources`. Entries still backed by a node of another source stay.
    fn unindex_source(&mut self, source: &NodeSource, nodes: &[JvmClass]) {
        for node in nodes {
            if let Some(defining) = self.node_sources.get_mut(&node.id) {
                defining.remove(source);
                if defining.is_empty() {
                    self.node_sources.remove(&node.id);
                }
            }
        }

        let mut stale_short_names = Vec::new();
        let mut stale_dependents = Vec::new();
        for node in nodes {
            let remaining = self.get_nodes(&node.id);
            if remaining.is_empty() {
                stale_short_names.push((node.short_name().to_string(), node.id.clone()));
            }
            for usage in &node.usages {
                let owner = usage.element_owner();
                let still_used = remaining
                    .iter()
                    .any(|n| n.usages.iter().any(|u| u.element_owner() == owner));
                if owner != node.id && !still_used {
                    stale_dependents.push((owner, node.id.clone()));
                }
            }
        }

        for (short_name, id) in stale_short_names {
            if let Some(ids) = self.short_names.get_mut(&short_name) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.short_names.remove(&short_name);
                }
            }
        }
        for (owner, id) in stale_dependents {
            if let Some(ids) = self.dependents.get_mut(&owner) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.dependents.remove(&owner);
                }
            }
        }
    }

    /// Nodes defined by a source.
    pub fn nodes_of_source(&self, source: &NodeSource) -> &[JvmClass] {
        self.sources.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sources defining the id.
    pub fn get_sources(&self, id: &ReferenceId) -> impl Iterator<Item = &NodeSource> {
        self.node_sources.get(id).into_iter().flatten()
    }

    /// Nodes with the id, across all defining sources.
    pub fn get_nodes(&self, id: &ReferenceId) -> Vec<&JvmClass> {
        self.get_sources(id)
            .flat_map(|s| self.nodes_of_source(s))
            .filter(|n| &n.id == id)
            .collect()
    }

    /// Ids of nodes that record a usage owned by `id`.
    pub fn get_depending_nodes(&self, id: &ReferenceId) -> impl Iterator<Item = &ReferenceId> {
        self.dependents.get(id).into_iter().flatten()
    }

    /// Ids of classes with the given short name.
    pub fn classes_by_short_name(&self, short_name: &str) -> impl Iterator<Item = &ReferenceId> {
        self.short_names.get(short_name).into_iter().flatten()
    }

    /// All node ids.
    pub fn registered_nodes(&self) -> impl Iterator<Item = &ReferenceId> {
        self.node_sources.keys()
    }

    /// All sources.
    pub fn all_sources(&self) -> impl Iterator<Item = &NodeSource> {
        self.sources.keys()
    }

    /// All nodes with their defining source.
    pub fn all_nodes(&self) -> impl Iterator<Item = (&NodeSource, &JvmClass)> {
        self.sources
            .iter()
            .flat_map(|(s, nodes)| nodes.iter().map(move |n| (s, n)))
    }

    /// Number of sources.
    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// Number of distinct node ids.
    pub fn num_nodes(&self) -> usize {
        self.node_sources.len()
    }

    /// SHA-256 hex digest of the canonical node listing.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(to_canonical_bytes(&self.sources));
        hex::encode(hasher.finalize())
    }

    /// Serialize the node listing to JSON.
    pub fn to_json(&self) -> Result<String, GraphError> {
        let listing = GraphListing {
            version: GRAPH_FORMAT_VERSION,
            sources: self.sources.clone(),
        };
        Ok(serde_json::to_string(&listing)?)
    }

    /// Load a graph from its JSON node listing, rebuilding indices.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let listing: GraphListing = serde_json::from_str(json)?;
        if listing.version != GRAPH_FORMAT_VERSION {
            return Err(GraphError::Version {
                found: listing.version,
                expected: GRAPH_FORMAT_VERSION,
            });
        }
        let mut graph = Self {
            sources: listing.sources,
            ..Self::default()
        };
        graph.rebuild_indices();
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JvmFlags, Usage};

    fn sample() -> Graph {
        let mut graph = Graph::new();
        graph.add_source(
            NodeSource::new("src/a/Foo.java"),
            vec![JvmClass::new("a/Foo", JvmFlags::PUBLIC)],
        );
        graph.add_source(
            NodeSource::new("src/b/Bar.java"),
            vec![JvmClass::new("b/Bar", JvmFlags::PUBLIC)
                .with_usage(Usage::method("a/Foo", "run", "()V"))
                .with_usage(Usage::class("b/Bar"))],
        );
        graph
    }

    #[test]
    fn test_indices() {
        let graph = sample();
        let foo = ReferenceId::new("a/Foo");
        let deps: Vec<_> = graph.get_depending_nodes(&foo).collect();
        assert_eq!(deps, vec![&ReferenceId::new("b/Bar")]);

        // self usages are not indexed
        assert_eq!(graph.get_depending_nodes(&ReferenceId::new("b/Bar")).count(), 0);

        assert_eq!(graph.classes_by_short_name("Foo").count(), 1);
        assert_eq!(graph.get_nodes(&foo).len(), 1);
        assert_eq!(graph.num_nodes(), 2);
    }

    #[test]
    fn test_unknown_id_is_empty() {
        let graph = sample();
        let missing = ReferenceId::new("java/util/List");
        assert!(graph.get_nodes(&missing).is_empty());
        assert_eq!(graph.get_sources(&missing).count(), 0);
        assert_eq!(graph.get_depending_nodes(&missing).count(), 0);
    }

    #[test]
    fn test_remove_source_updates_indices() {
        let mut graph = sample();
        graph.remove_source(&NodeSource::new("src/b/Bar.java"));
        assert_eq!(graph.get_depending_nodes(&ReferenceId::new("a/Foo")).count(), 0);
        assert_eq!(graph.num_sources(), 1);
    }

    #[test]
    fn test_incremental_indices_match_rebuild() {
        let mut graph = sample();
        let dup = NodeSource::new("gen/b/Bar.java");
        graph.add_source(
            dup.clone(),
            vec![JvmClass::new("b/Bar", JvmFlags::PUBLIC).with_usage(Usage::class("a/Foo"))],
        );
        graph.add_source(
            NodeSource::new("src/b/Bar.java"),
            vec![JvmClass::new("b/Bar", JvmFlags::PUBLIC)],
        );
        assert_eq!(graph.get_depending_nodes(&ReferenceId::new("a/Foo")).count(), 1);
        graph.remove_source(&dup);

        let mut rebuilt = graph.clone();
        rebuilt.rebuild_indices();
        assert_eq!(graph, rebuilt);
        assert_eq!(graph.get_depending_nodes(&ReferenceId::new("a/Foo")).count(), 0);
        assert_eq!(graph.classes_by_short_name("Bar").count(), 1);
    }

    #[test]
    fn test_json_roundtrip_preserves_digest() {
        let graph = sample();
        let json = graph.to_json().unwrap();
        let loaded = Graph::from_json(&json).unwrap();
        assert_eq!(loaded, graph);
        assert_eq!(loaded.digest(), graph.digest());
        assert_eq!(graph.digest().len(), 64);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let json = r#"{"version":99,"sources":{}}"#;
        assert!(matches!(Graph::from_json(json), Err(GraphError::Version { found: 99, .. })));
    }
}
