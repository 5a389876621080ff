//! Differentiation strategies.
//!
//! A strategy reacts to one category of change at a time: an added, removed
//! or changed class, method or field. Strategies are composed statically into
//! a [`StrategyChain`]; for each change every strategy is consulted in order.
//!
//! ## Chain contract
//!
//! - A hook returns `true` to let the next strategy see the same change and
//!   `false` to stop the chain for that change only. The shipped strategies
//!   are purely additive and always return `true`.
//! - Giving up on incremental compilation is not signalled through the return
//!   value; a rule calls [`DifferentiateContext::request_non_incremental`].
//! - Each hook invocation is isolated: a panicking rule is logged, turns the
//!   pass non-incremental, and the remaining strategies and changes still run.

pub mod java;
pub mod kotlin;
pub mod source_only;

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};

use crate::context::{DifferentiateContext, UsageConstraint};
use crate::diff::{deep_diff, Change, ClassDiff, FieldDiff, MethodDiff};
use crate::types::{JvmClass, JvmField, JvmMethod, ReferenceId, Usage};
use crate::utils::Utils;

pub use java::JavaDifferentiateStrategy;
pub use kotlin::KotlinAwareStrategy;
pub use source_only::SourceOnlyStrategy;

/// A changed class.
pub type ClassChange<'a> = Change<'a, JvmClass, ClassDiff<'a>>;
/// A changed method.
pub type MethodChange<'a> = Change<'a, JvmMethod, MethodDiff<'a>>;
/// A changed field.
pub type FieldChange<'a> = Change<'a, JvmField, FieldDiff<'a>>;

/// Capability set of a differentiation strategy.
///
/// Every hook defaults to doing nothing and continuing the chain. `future`
/// views the graph after the round, `present` before it.
#[allow(unused_variables)]
pub trait JvmDifferentiateStrategy {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// A class appeared.
    fn process_added_class<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        added: &'a JvmClass,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        true
    }

    /// A class disappeared.
    fn process_removed_class<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        removed: &'a JvmClass,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        true
    }

    /// A class changed. Member changes are reported separately.
    fn process_changed_class<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        true
    }

    /// A method appeared in a changed class.
    fn process_added_method<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        added: &'a JvmMethod,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        true
    }

    /// A method disappeared from a changed class.
    fn process_removed_method<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        removed: &'a JvmMethod,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        true
    }

    /// A method of a changed class changed.
    fn process_changed_method<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        method: &MethodChange<'a>,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        true
    }

    /// A field appeared in a changed class.
    fn process_added_field<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        added: &'a JvmField,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        true
    }

    /// A field disappeared from a changed class.
    fn process_removed_field<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        removed: &'a JvmField,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        true
    }

    /// A field of a changed class changed.
    fn process_changed_field<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        field: &FieldChange<'a>,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        true
    }
}

/// Run `rule`, turning a panic into a non-incremental request.
///
/// Returns the rule's continue flag; a panicking rule continues.
pub(crate) fn isolate<'a>(
    ctx: &mut DifferentiateContext<'a>,
    strategy: &str,
    event: &str,
    subject: &ReferenceId,
    rule: impl FnOnce(&mut DifferentiateContext<'a>) -> bool,
) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| rule(&mut *ctx))) {
        Ok(proceed) => proceed,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(
                strategy,
                event,
                class = %subject,
                error = %message,
                "Differentiation rule failed"
            );
            ctx.request_non_incremental(format!("{strategy} rule failed on {event} {subject}: {message}"));
            true
        }
    }
}

/// Ordered, statically composed list of strategies.
pub struct StrategyChain {
    strategies: Vec<Box<dyn JvmDifferentiateStrategy>>,
}

impl StrategyChain {
    /// Chain of the given strategies, consulted in order.
    pub fn new(strategies: Vec<Box<dyn JvmDifferentiateStrategy>>) -> Self {
        Self { strategies }
    }

    /// Names of the strategies, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    fn dispatch<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        event: &str,
        subject: &ReferenceId,
        mut hook: impl FnMut(&dyn JvmDifferentiateStrategy, &mut DifferentiateContext<'a>) -> bool,
    ) {
        for strategy in &self.strategies {
            let strategy = strategy.as_ref();
            let proceed = isolate(ctx, strategy.name(), event, subject, |ctx| hook(strategy, ctx));
            if !proceed {
                tracing::debug!(strategy = strategy.name(), event, class = %subject, "Strategy stopped the chain");
                break;
            }
        }
    }

    /// Diff the delta's class sets and run every strategy over every change.
    pub fn differentiate<'a>(&self, ctx: &mut DifferentiateContext<'a>, future: &Utils<'a>, present: &Utils<'a>) {
        let delta = ctx.delta();
        let classes = deep_diff(delta.nodes_before(), delta.nodes_after());
        tracing::debug!(
            added = classes.added().len(),
            removed = classes.removed().len(),
            changed = classes.changed().len(),
            "Class changes"
        );

        for &removed in classes.removed() {
            self.dispatch(ctx, "removed class", &removed.id, |s, ctx| {
                s.process_removed_class(ctx, removed, future, present)
            });
        }
        for &added in classes.added() {
            self.dispatch(ctx, "added class", &added.id, |s, ctx| {
                s.process_added_class(ctx, added, future, present)
            });
        }

        for change in classes.changed() {
            let id = &change.now.id;
            self.dispatch(ctx, "changed class", id, |s, ctx| {
                s.process_changed_class(ctx, change, future, present)
            });

            let methods = &change.diff.methods;
            for &m in methods.removed() {
                self.dispatch(ctx, "removed method", id, |s, ctx| {
                    s.process_removed_method(ctx, change, m, future, present)
                });
            }
            for &m in methods.added() {
                self.dispatch(ctx, "added method", id, |s, ctx| {
                    s.process_added_method(ctx, change, m, future, present)
                });
            }
            for m in methods.changed() {
                self.dispatch(ctx, "changed method", id, |s, ctx| {
                    s.process_changed_method(ctx, change, m, future, present)
                });
            }

            let fields = &change.diff.fields;
            for &f in fields.removed() {
                self.dispatch(ctx, "removed field", id, |s, ctx| {
                    s.process_removed_field(ctx, change, f, future, present)
                });
            }
            for &f in fields.added() {
                self.dispatch(ctx, "added field", id, |s, ctx| {
                    s.process_added_field(ctx, change, f, future, present)
                });
            }
            for f in fields.changed() {
                self.dispatch(ctx, "changed field", id, |s, ctx| {
                    s.process_changed_field(ctx, change, f, future, present)
                });
            }
        }
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(JavaDifferentiateStrategy::new()),
            Box::new(KotlinAwareStrategy::new()),
        ])
    }
}

impl std::fmt::Debug for StrategyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Affect usages of `method` through `owner` and every subclass that inherits it.
pub(crate) fn affect_method_usages(ctx: &mut DifferentiateContext<'_>, future: &Utils<'_>, owner: &ReferenceId, method: &JvmMethod) {
    let propagated = future.collect_subclasses_without_method(owner, method);
    affect_usages(ctx, owner, &propagated, |id| method.create_usage(id), None);
}

/// Affect reads of `field` through `owner` and every subclass that inherits it.
///
/// Returns the inheriting subclasses.
pub(crate) fn affect_field_usages(
    ctx: &mut DifferentiateContext<'_>,
    utils: &Utils<'_>,
    owner: &ReferenceId,
    field: &JvmField,
) -> BTreeSet<ReferenceId> {
    let propagated = utils.collect_subclasses_without_field(owner, &field.name);
    affect_usages(ctx, owner, &propagated, |id| field.create_usage(id), None);
    propagated
}

/// Affect the usage built by `usage` for `owner` and each propagated id.
pub(crate) fn affect_usages(
    ctx: &mut DifferentiateContext<'_>,
    owner: &ReferenceId,
    propagated: &BTreeSet<ReferenceId>,
    usage: impl Fn(&ReferenceId) -> Usage,
    constraint: Option<&UsageConstraint>,
) {
    for id in std::iter::once(owner).chain(propagated) {
        match constraint {
            Some(c) => ctx.affect_usage_with(usage(id), c.clone()),
            None => ctx.affect_usage(usage(id)),
        }
    }
}

/// Affect the sources of `owner` and every transitive subclass, and
/// optionally their class usages.
pub(crate) fn affect_subclasses(ctx: &mut DifferentiateContext<'_>, future: &Utils<'_>, owner: &ReferenceId, affect_usages: bool) {
    tracing::debug!(class = %owner, affect_usages, "Affect subclasses");
    for sub in future.with_all_subclasses(owner) {
        if affect_usages {
            ctx.affect_usage(Usage::class(sub.clone()));
        }
        ctx.affect_node(sub);
    }
}

/// Affect lambda instantiations of `owner` and its subtypes that were functional interfaces.
pub(crate) fn affect_lambda_instantiations(ctx: &mut DifferentiateContext<'_>, present: &Utils<'_>, owner: &ReferenceId) {
    for id in present.with_all_subclasses(owner) {
        if present.is_lambda_target_id(&id) {
            ctx.affect_usage(Usage::class_new(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Delta;
    use crate::graph::Graph;
    use crate::params::DifferentiateParams;
    use crate::types::{JvmFlags, NodeSource};
    use std::cell::Cell;
    use std::rc::Rc;

    struct Recording {
        name: &'static str,
        proceed: bool,
        seen: Rc<Cell<usize>>,
    }

    impl JvmDifferentiateStrategy for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process_added_class<'a>(
            &self,
            _ctx: &mut DifferentiateContext<'a>,
            _added: &'a JvmClass,
            _future: &Utils<'a>,
            _present: &Utils<'a>,
        ) -> bool {
            self.seen.set(self.seen.get() + 1);
            self.proceed
        }
    }

    struct Panicking;

    impl JvmDifferentiateStrategy for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn process_added_class<'a>(
            &self,
            _ctx: &mut DifferentiateContext<'a>,
            added: &'a JvmClass,
            _future: &Utils<'a>,
            _present: &Utils<'a>,
        ) -> bool {
            panic!("cannot handle {}", added.id);
        }
    }

    fn delta_with_added_class(graph: &Graph) -> Delta {
        let mut delta = Delta::new(graph, Vec::new(), Vec::new());
        delta.associate(graph, NodeSource::new("a/New.java"), vec![JvmClass::new("a/New", JvmFlags::PUBLIC)]);
        delta
    }

    #[test]
    fn test_false_stops_chain_for_that_change() {
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let chain = StrategyChain::new(vec![
            Box::new(Recording { name: "first", proceed: false, seen: first.clone() }),
            Box::new(Recording { name: "second", proceed: true, seen: second.clone() }),
        ]);

        let graph = Graph::new();
        let delta = delta_with_added_class(&graph);
        let params = DifferentiateParams::default();
        let mut ctx = DifferentiateContext::new(&graph, &delta, &params);
        chain.differentiate(&mut ctx, &Utils::future(&graph, &delta), &Utils::present(&graph));

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);
    }

    #[test]
    fn test_panicking_rule_is_isolated() {
        let after = Rc::new(Cell::new(0));
        let chain = StrategyChain::new(vec![
            Box::new(Panicking),
            Box::new(Recording { name: "after", proceed: true, seen: after.clone() }),
        ]);

        let graph = Graph::new();
        let delta = delta_with_added_class(&graph);
        let params = DifferentiateParams::default();
        let mut ctx = DifferentiateContext::new(&graph, &delta, &params);
        chain.differentiate(&mut ctx, &Utils::future(&graph, &delta), &Utils::present(&graph));

        assert_eq!(after.get(), 1);
        assert!(ctx.is_non_incremental());
    }

    #[test]
    fn test_default_chain_order() {
        assert_eq!(StrategyChain::default().names(), vec!["java", "kotlin"]);
    }
}
