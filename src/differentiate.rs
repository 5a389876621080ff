//! One differentiation pass.
//!
//! Given the committed graph and a round's delta, the [`Differentiator`]
//! runs the strategy chain (or the source-only strategy) and returns the
//! sources that must be recompiled next.
//!
//! ## Pass
//!
//! 1. Build the present and future views
//! 2. Source-only delta: run [`SourceOnlyStrategy`] over the present view
//! 3. Otherwise: diff every changed source and dispatch to the chain
//! 4. Match recorded usages against the future view
//!
//! The graph is never mutated; committing the delta is the caller's job.

use crate::context::{DifferentiateContext, DifferentiateResult};
use crate::delta::Delta;
use crate::graph::Graph;
use crate::params::DifferentiateParams;
use crate::strategy::{SourceOnlyStrategy, StrategyChain};
use crate::utils::Utils;

/// Runs differentiation passes with a fixed strategy chain.
#[derive(Debug, Default)]
pub struct Differentiator {
    chain: StrategyChain,
    source_only: SourceOnlyStrategy,
}

impl Differentiator {
    /// Differentiator with a custom chain.
    pub fn new(chain: StrategyChain) -> Self {
        Self { chain, source_only: SourceOnlyStrategy::new() }
    }

    /// The strategy chain.
    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }

    /// Compute the sources affected by the delta.
    ///
    /// Deterministic: the same graph, delta and params give the same result.
    pub fn differentiate(&self, graph: &Graph, delta: &Delta, params: &DifferentiateParams) -> DifferentiateResult {
        let span = tracing::info_span!(
            "differentiate",
            compiled = delta.base_sources().len(),
            deleted = delta.deleted_sources().len(),
            source_only = delta.is_source_only(),
        );
        let _guard = span.enter();

        let present = Utils::present(graph);
        let future = Utils::future(graph, delta);
        let mut ctx = DifferentiateContext::new(graph, delta, params);

        if delta.is_source_only() {
            self.source_only.differentiate(&mut ctx, &present);
        } else {
            self.chain.differentiate(&mut ctx, &future, &present);
        }
        ctx.finish(&future)
    }
}

/// Run one pass with the default chain.
pub fn differentiate(graph: &Graph, delta: &Delta, params: &DifferentiateParams) -> DifferentiateResult {
    Differentiator::default().differentiate(graph, delta, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JvmClass, JvmFlags, JvmMethod, NodeSource, TypeRepr, Usage};

    fn graph() -> Graph {
        let foo = JvmClass::new("a/Foo", JvmFlags::PUBLIC)
            .with_method(JvmMethod::new("run", JvmFlags::PUBLIC, vec![], TypeRepr::void()));
        let caller = JvmClass::new("b/Caller", JvmFlags::PUBLIC)
            .with_usage(Usage::class("a/Foo"))
            .with_usage(Usage::method("a/Foo", "run", "()V"));
        let mut graph = Graph::new();
        graph.add_source(NodeSource::new("a/Foo.java"), vec![foo]);
        graph.add_source(NodeSource::new("b/Caller.java"), vec![caller]);
        graph
    }

    #[test]
    fn test_empty_delta_affects_nothing() {
        let graph = graph();
        let delta = Delta::new(&graph, Vec::new(), Vec::new());
        let result = differentiate(&graph, &delta, &DifferentiateParams::default());
        assert!(result.affected_sources.is_empty());
        assert!(result.is_incremental());
    }

    #[test]
    fn test_unchanged_recompile_affects_nothing() {
        let graph = graph();
        let mut delta = Delta::new(&graph, vec![NodeSource::new("a/Foo.java")], Vec::new());
        delta.associate(&graph, NodeSource::new("a/Foo.java"), graph.nodes_of_source(&NodeSource::new("a/Foo.java")).to_vec());
        let result = differentiate(&graph, &delta, &DifferentiateParams::default());
        assert!(result.affected_sources.is_empty());
    }

    #[test]
    fn test_deleted_source_affects_users() {
        let graph = graph();
        let delta = Delta::new(&graph, Vec::new(), vec![NodeSource::new("a/Foo.java")]);
        let result = differentiate(&graph, &delta, &DifferentiateParams::default());
        assert!(result.affected_sources.contains(&NodeSource::new("b/Caller.java")));
    }

    #[test]
    fn test_deterministic() {
        let graph = graph();
        let delta = Delta::new(&graph, Vec::new(), vec![NodeSource::new("a/Foo.java")]);
        let params = DifferentiateParams::default();
        let first = differentiate(&graph, &delta, &params);
        let second = differentiate(&graph, &delta, &params);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }
}
