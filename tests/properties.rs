//! Property-based tests over random class hierarchies.
//!
//! Hierarchies are generated with arbitrary super class links, including
//! self-links and cycles, which real bytecode never has but queries must
//! survive.

use proptest::prelude::*;

use recompile_kernel::{
    differentiate, Delta, DifferentiateParams, Graph, JvmClass, JvmFlags, JvmMethod, NodeSource, ReferenceId,
    TypeRepr, Usage, Utils,
};

// ============================================================================
// Generators
// ============================================================================

/// Per class: super class index, whether it declares `run`, index of the class it calls.
type Spec = Vec<(usize, bool, usize)>;

fn hierarchy() -> impl Strategy<Value = Spec> {
    prop::collection::vec((0usize..16, any::<bool>(), 0usize..16), 2..16)
}

fn name(i: usize) -> String {
    format!("p/C{i}")
}

fn src(i: usize) -> NodeSource {
    NodeSource::new(format!("p/C{i}.java"))
}

fn run() -> JvmMethod {
    JvmMethod::new("run", JvmFlags::PUBLIC, vec![], TypeRepr::void())
}

fn class(spec: &Spec, i: usize, declares: bool) -> JvmClass {
    let n = spec.len();
    let (sup, _, uses) = spec[i];
    let mut cls = JvmClass::new(name(i), JvmFlags::PUBLIC)
        .with_super(name(sup % n))
        .with_usage(Usage::class(name(uses % n)))
        .with_usage(Usage::method(name(uses % n), "run", "()V"));
    if declares {
        cls = cls.with_method(run());
    }
    cls
}

fn build(spec: &Spec, order: impl Iterator<Item = usize>) -> Graph {
    let mut graph = Graph::new();
    for i in order {
        graph.add_source(src(i), vec![class(spec, i, spec[i].1)]);
    }
    graph
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_subclass_closures_exclude_owner(spec in hierarchy()) {
        let graph = build(&spec, 0..spec.len());
        let utils = Utils::present(&graph);
        for i in 0..spec.len() {
            let id = ReferenceId::new(name(i));
            let all = utils.all_subclasses(&id);
            prop_assert!(!all.contains(&id));
            prop_assert!(!utils.collect_subclasses_without_method(&id, &run()).contains(&id));

            let with_all = utils.with_all_subclasses(&id);
            prop_assert!(with_all.contains(&id));
            prop_assert!(all.is_subset(&with_all));
        }
    }

    #[test]
    fn prop_supertype_closure_terminates(spec in hierarchy()) {
        let graph = build(&spec, 0..spec.len());
        let utils = Utils::present(&graph);
        for i in 0..spec.len() {
            let supertypes = utils.all_supertypes(&ReferenceId::new(name(i)));
            prop_assert!(supertypes.len() <= spec.len() + 1);
        }
    }

    #[test]
    fn prop_pass_is_idempotent(spec in hierarchy(), changed in 0usize..16) {
        let graph = build(&spec, 0..spec.len());
        let changed = changed % spec.len();
        let mut delta = Delta::new(&graph, vec![src(changed)], Vec::new());
        delta.associate(&graph, src(changed), vec![class(&spec, changed, !spec[changed].1)]);
        let params = DifferentiateParams::default();

        let first = differentiate(&graph, &delta, &params);
        let second = differentiate(&graph, &delta, &params);
        prop_assert_eq!(&first, &second);
        prop_assert!(!first.affected_sources.contains(&src(changed)));
    }

    #[test]
    fn prop_deleted_sources_never_reported(spec in hierarchy(), deleted in 0usize..16) {
        let graph = build(&spec, 0..spec.len());
        let deleted = deleted % spec.len();
        let delta = Delta::new(&graph, Vec::new(), vec![src(deleted)]);
        let result = differentiate(&graph, &delta, &DifferentiateParams::default());
        prop_assert!(!result.affected_sources.contains(&src(deleted)));
    }

    #[test]
    fn prop_digest_independent_of_insertion_order(spec in hierarchy()) {
        let forward = build(&spec, 0..spec.len());
        let backward = build(&spec, (0..spec.len()).rev());
        prop_assert_eq!(forward.digest(), backward.digest());
    }
}
