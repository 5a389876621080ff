//! Differentiation for rounds without bytecode changes.
//!
//! Kotlin sources can need recompilation even when a recompiled source
//! produced identical classes: type inference across a hierarchy, sealed
//! exhaustiveness and type alias expansion are resolved from source. This
//! strategy inspects the base sources of a source-only delta directly.

use std::collections::BTreeSet;

use super::isolate;
use crate::context::DifferentiateContext;
use crate::kjvm;
use crate::types::{JvmClass, NodeSource, ReferenceId, Usage};
use crate::utils::Utils;

/// Strategy run instead of the chain when a delta is source-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceOnlyStrategy;

impl SourceOnlyStrategy {
    /// New strategy.
    pub fn new() -> Self {
        Self
    }

    /// Affect what the base sources of a source-only delta can influence.
    ///
    /// Each step is isolated; a failing step makes the pass non-incremental
    /// and the remaining steps still run.
    pub fn differentiate<'a>(&self, ctx: &mut DifferentiateContext<'a>, utils: &Utils<'a>) {
        let graph = ctx.graph();
        let base: &BTreeSet<NodeSource> = ctx.delta().base_sources();
        let nodes: Vec<&'a JvmClass> = base.iter().flat_map(|s| graph.nodes_of_source(s)).collect();
        tracing::debug!(sources = base.len(), nodes = nodes.len(), "Source-only differentiation");

        for &node in &nodes {
            isolate(ctx, "source-only", "subclass usages", &node.id, |ctx| {
                if !node.is_private() {
                    for sub in utils.all_subclasses(&node.id) {
                        ctx.affect_usage(Usage::class(sub));
                    }
                }
                true
            });
        }

        for &node in &nodes {
            isolate(ctx, "source-only", "sealed subclasses", &node.id, |ctx| {
                if kjvm::is_kotlin_node(node) && kjvm::is_sealed(node) {
                    for sub in utils.direct_subclasses(&node.id) {
                        for source in utils.get_node_sources(sub) {
                            if !base.contains(&source) {
                                tracing::debug!(sealed = %node.id, subclass = %sub, source = %source, "Recompile sealed hierarchy as a unit");
                                ctx.affect_node_source(source);
                            }
                        }
                    }
                }
                true
            });
        }

        let mut watched: BTreeSet<Usage> = BTreeSet::new();
        for &node in &nodes {
            if kjvm::is_kotlin_node(node) {
                let scope = kjvm::lookup_scope(node);
                watched.extend(kjvm::type_aliases(node).iter().map(|a| Usage::lookup(scope.clone(), a.name.clone())));
            }
        }
        if watched.is_empty() {
            return;
        }

        let supertypes: BTreeSet<ReferenceId> = nodes.iter().flat_map(|n| utils.all_supertypes(&n.id)).collect();
        for id in supertypes {
            isolate(ctx, "source-only", "type alias lookups", &id, |ctx| {
                for source in utils.get_node_sources(&id) {
                    if base.contains(&source) {
                        continue;
                    }
                    let uses_alias = graph
                        .nodes_of_source(&source)
                        .iter()
                        .filter(|n| kjvm::is_kotlin_node(n))
                        .any(|n| n.usages.iter().any(|u| watched.contains(u)));
                    if uses_alias {
                        tracing::debug!(source = %source, "Supertype source looks up a changed type alias");
                        ctx.affect_node_source(source);
                    }
                }
                true
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Delta;
    use crate::graph::Graph;
    use crate::params::DifferentiateParams;
    use crate::types::{JvmFlags, KmTypeAlias, KotlinMeta, Modality, Visibility};

    fn kotlin(name: &str) -> JvmClass {
        JvmClass::new(name, JvmFlags::PUBLIC).with_kotlin(KotlinMeta::Class(KotlinMeta::class(name)))
    }

    fn run(graph: &Graph, base: &[&str]) -> crate::DifferentiateResult {
        let delta = Delta::source_only(graph, base.iter().map(|s| NodeSource::new(*s)));
        let params = DifferentiateParams::default();
        let utils = Utils::present(graph);
        let mut ctx = DifferentiateContext::new(graph, &delta, &params);
        SourceOnlyStrategy::new().differentiate(&mut ctx, &utils);
        ctx.finish(&utils)
    }

    #[test]
    fn test_subclass_class_usages() {
        let mut graph = Graph::new();
        graph.add_source(NodeSource::new("a/Base.kt"), vec![kotlin("a/Base")]);
        graph.add_source(NodeSource::new("a/Derived.kt"), vec![kotlin("a/Derived").with_super("a/Base")]);
        graph.add_source(
            NodeSource::new("b/User.kt"),
            vec![kotlin("b/User").with_usage(Usage::class("a/Derived"))],
        );

        let result = run(&graph, &["a/Base.kt"]);
        let sources: Vec<_> = result.affected_sources.iter().map(|s| s.path()).collect();
        assert_eq!(sources, vec!["b/User.kt"]);
    }

    #[test]
    fn test_sealed_subclass_sources() {
        let mut meta = KotlinMeta::class("a/Expr");
        meta.modality = Modality::Sealed;
        let expr = JvmClass::new("a/Expr", JvmFlags::PUBLIC | JvmFlags::ABSTRACT).with_kotlin(KotlinMeta::Class(meta));
        let mut graph = Graph::new();
        graph.add_source(NodeSource::new("a/Expr.kt"), vec![expr]);
        graph.add_source(NodeSource::new("a/Lit.kt"), vec![kotlin("a/Lit").with_super("a/Expr")]);

        let result = run(&graph, &["a/Expr.kt"]);
        assert!(result.affected_sources.contains(&NodeSource::new("a/Lit.kt")));
    }

    #[test]
    fn test_type_alias_lookup_in_supertype_source() {
        let mut meta = KotlinMeta::class("a/Child");
        meta.type_aliases.push(KmTypeAlias { name: "Handler".to_string(), visibility: Visibility::Public });
        let child = JvmClass::new("a/Child", JvmFlags::PUBLIC)
            .with_super("a/Parent")
            .with_kotlin(KotlinMeta::Class(meta));
        let parent = kotlin("a/Parent").with_usage(Usage::lookup("a/Child", "Handler"));
        let mut graph = Graph::new();
        graph.add_source(NodeSource::new("a/Child.kt"), vec![child]);
        graph.add_source(NodeSource::new("a/Parent.kt"), vec![parent]);

        let result = run(&graph, &["a/Child.kt"]);
        assert!(result.affected_sources.contains(&NodeSource::new("a/Parent.kt")));
    }
}
