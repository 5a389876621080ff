//! Accumulator for one differentiation pass.
//!
//! Strategies never touch the graph. They record what must be recompiled on a
//! [`DifferentiateContext`]: sources and nodes directly, or usages (optionally
//! constrained) and usage queries that are matched against every node of the
//! future graph when the pass finishes. All writes are set-based, so recording
//! the same thing twice is a no-op.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::canonical::canonical_hash_hex;
use crate::delta::Delta;
use crate::graph::Graph;
use crate::kjvm;
use crate::params::DifferentiateParams;
use crate::types::{JvmClass, NodeSource, ReferenceId, Usage};
use crate::utils::Utils;

/// Restricts which nodes an affected usage applies to.
///
/// Constraints are evaluated against the future graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageConstraint {
    /// Nodes outside the package.
    OutsidePackage(String),
    /// Nodes outside the package that do not inherit from `root`.
    OutsidePackageNonInheritor {
        /// Package of the changed member's owner.
        package: String,
        /// Owner of the changed member.
        root: ReferenceId,
    },
    /// Nodes compiled from Kotlin.
    KotlinNodes,
    /// Synthetic nodes (switch maps and similar).
    SyntheticNodes,
}

impl UsageConstraint {
    /// Whether the constraint admits the node.
    pub fn accepts(&self, node: &JvmClass, future: &Utils<'_>) -> bool {
        match self {
            Self::OutsidePackage(package) => node.package_name() != package.as_str(),
            Self::OutsidePackageNonInheritor { package, root } => {
                node.package_name() != package.as_str() && !future.is_inheritor(&node.id, root)
            }
            Self::KotlinNodes => kjvm::is_kotlin_node(node),
            Self::SyntheticNodes => node.flags.is_synthetic(),
        }
    }
}

impl fmt::Display for UsageConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutsidePackage(p) => write!(f, "outside {p}"),
            Self::OutsidePackageNonInheritor { package, root } => write!(f, "outside {package}, not inheriting {root}"),
            Self::KotlinNodes => write!(f, "kotlin nodes"),
            Self::SyntheticNodes => write!(f, "synthetic nodes"),
        }
    }
}

/// Predicate over a node and one of its usages.
pub type UsageQuery<'a> = Box<dyn Fn(&JvmClass, &Usage) -> bool + 'a>;

/// Mutable state of one differentiation pass.
pub struct DifferentiateContext<'a> {
    graph: &'a Graph,
    delta: &'a Delta,
    params: &'a DifferentiateParams,
    affected_sources: BTreeSet<NodeSource>,
    affected_nodes: BTreeSet<ReferenceId>,
    /// Usage -> constraints; `None` admits every node.
    affected_usages: BTreeMap<Usage, Vec<Option<UsageConstraint>>>,
    usage_queries: Vec<(&'static str, UsageQuery<'a>)>,
    non_incremental: Vec<String>,
}

impl<'a> DifferentiateContext<'a> {
    /// Start a pass over `delta`.
    pub fn new(graph: &'a Graph, delta: &'a Delta, params: &'a DifferentiateParams) -> Self {
        Self {
            graph,
            delta,
            params,
            affected_sources: BTreeSet::new(),
            affected_nodes: BTreeSet::new(),
            affected_usages: BTreeMap::new(),
            usage_queries: Vec::new(),
            non_incremental: Vec::new(),
        }
    }

    /// Committed graph.
    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// Round being differentiated.
    pub fn delta(&self) -> &'a Delta {
        self.delta
    }

    /// Pass parameters.
    pub fn params(&self) -> &'a DifferentiateParams {
        self.params
    }

    /// Source was compiled in this round.
    pub fn is_compiled(&self, source: &NodeSource) -> bool {
        self.delta.is_compiled(source)
    }

    /// Recompile every node that records the usage.
    pub fn affect_usage(&mut self, usage: Usage) {
        tracing::debug!(usage = %usage, "Affect usage");
        self.push_usage(usage, None);
    }

    /// Recompile nodes that record the usage and satisfy the constraint.
    pub fn affect_usage_with(&mut self, usage: Usage, constraint: UsageConstraint) {
        tracing::debug!(usage = %usage, constraint = %constraint, "Affect constrained usage");
        self.push_usage(usage, Some(constraint));
    }

    fn push_usage(&mut self, usage: Usage, constraint: Option<UsageConstraint>) {
        let constraints = self.affected_usages.entry(usage).or_default();
        if !constraints.contains(&constraint) {
            constraints.push(constraint);
        }
    }

    /// Recompile every node with a usage matching the query.
    pub fn affect_usage_query(&mut self, name: &'static str, query: impl Fn(&JvmClass, &Usage) -> bool + 'a) {
        tracing::debug!(query = name, "Affect usage query");
        self.usage_queries.push((name, Box::new(query)));
    }

    /// Recompile the source.
    pub fn affect_node_source(&mut self, source: NodeSource) {
        if self.affected_sources.insert(source.clone()) {
            tracing::debug!(source = %source, "Affect source");
        }
    }

    /// Recompile every source defining the node.
    pub fn affect_node(&mut self, id: ReferenceId) {
        if self.affected_nodes.insert(id.clone()) {
            tracing::debug!(node = %id, "Affect node");
        }
    }

    /// Give up on incremental compilation for this pass.
    pub fn request_non_incremental(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::info!(reason = %reason, "Non-incremental change");
        self.non_incremental.push(reason);
    }

    /// A rule already gave up on incremental compilation.
    pub fn is_non_incremental(&self) -> bool {
        !self.non_incremental.is_empty()
    }

    fn usage_affects(&self, node: &JvmClass, usage: &Usage, future: &Utils<'_>) -> bool {
        let by_usage = self.affected_usages.get(usage).map_or(false, |constraints| {
            constraints
                .iter()
                .any(|c| c.as_ref().map_or(true, |c| c.accepts(node, future)))
        });
        by_usage || self.usage_queries.iter().any(|(_, q)| q(node, usage))
    }

    /// Match the recorded usages against the future graph and compute the result.
    ///
    /// Nodes of sources compiled or deleted in this round are never reported;
    /// sources rejected by the affection filter are dropped. An affected
    /// generated node makes the pass non-incremental.
    pub fn finish(mut self, future: &Utils<'_>) -> DifferentiateResult {
        let mut affected_nodes = std::mem::take(&mut self.affected_nodes);

        if self.params.calculate_affected && !(self.affected_usages.is_empty() && self.usage_queries.is_empty()) {
            for (source, node) in future.all_nodes() {
                if self.delta.is_compiled(source) || affected_nodes.contains(&node.id) {
                    continue;
                }
                if node.usages.iter().any(|u| self.usage_affects(node, u, future)) {
                    affected_nodes.insert(node.id.clone());
                }
            }
        }

        let mut sources = std::mem::take(&mut self.affected_sources);
        for id in &affected_nodes {
            for node in future.get_nodes(id) {
                if node.flags.is_generated() {
                    self.request_non_incremental(format!("generated class {id} is affected"));
                }
            }
            sources.extend(future.get_node_sources(id));
        }
        sources.retain(|s| !self.delta.is_compiled(s) && !self.delta.is_deleted(s) && self.params.is_affectable(s));

        let result = DifferentiateResult {
            affected_sources: sources,
            affected_nodes,
            non_incremental_reasons: self.non_incremental,
        };
        tracing::info!(
            affected_sources = result.affected_sources.len(),
            affected_nodes = result.affected_nodes.len(),
            affected_usages = self.affected_usages.len(),
            usage_queries = self.usage_queries.len(),
            incremental = result.is_incremental(),
            "Differentiation finished"
        );
        result
    }
}

impl fmt::Debug for DifferentiateContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifferentiateContext")
            .field("affected_sources", &self.affected_sources)
            .field("affected_nodes", &self.affected_nodes)
            .field("affected_usages", &self.affected_usages.len())
            .field("usage_queries", &self.usage_queries.iter().map(|(n, _)| *n).collect::<Vec<_>>())
            .field("non_incremental", &self.non_incremental)
            .finish()
    }
}

/// Outcome of one differentiation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferentiateResult {
    /// Sources to recompile next.
    pub affected_sources: BTreeSet<NodeSource>,
    /// Nodes whose sources must be recompiled.
    pub affected_nodes: BTreeSet<ReferenceId>,
    /// Why the pass cannot be handled incrementally, if it cannot.
    pub non_incremental_reasons: Vec<String>,
}

#[derive(Serialize)]
struct ResultFingerprint<'r> {
    affected_sources: &'r BTreeSet<NodeSource>,
    incremental: bool,
}

impl DifferentiateResult {
    /// The affected sources are enough; no full rebuild needed.
    pub fn is_incremental(&self) -> bool {
        self.non_incremental_reasons.is_empty()
    }

    /// Canonical hash of the affected source set and incremental flag.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&ResultFingerprint {
            affected_sources: &self.affected_sources,
            incremental: self.is_incremental(),
        })
    }
}
