//! End-to-end differentiation scenarios.
//!
//! Each test builds a small committed graph, simulates one compilation round
//! and checks the affected source set.

use std::collections::BTreeSet;

use recompile_kernel::{
    differentiate, Delta, DifferentiateParams, DifferentiateResult, Graph, JvmClass, JvmField, JvmFlags,
    JvmMethod, KmClassKind, KotlinMeta, Modality, NodeSource, ReferenceId, TypeRepr, Usage, Utils,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn src(path: &str) -> NodeSource {
    NodeSource::new(path)
}

fn kotlin_class(name: &str, flags: JvmFlags) -> JvmClass {
    JvmClass::new(name, flags).with_kotlin(KotlinMeta::Class(KotlinMeta::class(name)))
}

fn sealed(name: &str) -> JvmClass {
    let mut meta = KotlinMeta::class(name);
    meta.modality = Modality::Sealed;
    JvmClass::new(name, JvmFlags::PUBLIC | JvmFlags::ABSTRACT).with_kotlin(KotlinMeta::Class(meta))
}

fn string() -> TypeRepr {
    TypeRepr::class("java/lang/String")
}

fn method(name: &str, flags: JvmFlags, args: Vec<TypeRepr>, ret: TypeRepr) -> JvmMethod {
    JvmMethod::new(name, flags, args, ret)
}

fn graph_of(sources: Vec<(&str, Vec<JvmClass>)>) -> Graph {
    let mut graph = Graph::new();
    for (path, nodes) in sources {
        graph.add_source(src(path), nodes);
    }
    graph
}

/// One round: `compiled` sources produce the given nodes, `deleted` are removed.
fn round(
    graph: &Graph,
    compiled: Vec<(&str, Vec<JvmClass>)>,
    deleted: &[&str],
    params: &DifferentiateParams,
) -> DifferentiateResult {
    let mut delta = Delta::new(
        graph,
        compiled.iter().map(|(path, _)| src(path)),
        deleted.iter().map(|path| src(path)),
    );
    for (path, nodes) in compiled {
        delta.associate(graph, src(path), nodes);
    }
    differentiate(graph, &delta, params)
}

fn affected(result: &DifferentiateResult) -> BTreeSet<&str> {
    result.affected_sources.iter().map(|s| s.path()).collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Sealed Hierarchies
// ─────────────────────────────────────────────────────────────────────────────

fn sealed_graph() -> Graph {
    graph_of(vec![
        ("a/Sealed.kt", vec![sealed("a/Sealed")]),
        ("a/CaseA.kt", vec![kotlin_class("a/CaseA", JvmFlags::PUBLIC | JvmFlags::FINAL).with_super("a/Sealed")]),
        ("a/Other.kt", vec![kotlin_class("a/Other", JvmFlags::PUBLIC)]),
    ])
}

#[test]
fn test_sealed_case_added_affects_sealed_source() {
    init_tracing();
    let graph = sealed_graph();
    let case_b = kotlin_class("a/CaseB", JvmFlags::PUBLIC | JvmFlags::FINAL).with_super("a/Sealed");

    let result = round(&graph, vec![("a/CaseB.kt", vec![case_b])], &[], &DifferentiateParams::default());

    let sources = affected(&result);
    assert!(sources.contains("a/Sealed.kt"));
    assert!(!sources.contains("a/Other.kt"));
    assert!(result.is_incremental());
}

#[test]
fn test_sealed_case_removed_affects_sealed_source() {
    let graph = sealed_graph();
    let result = round(&graph, Vec::new(), &["a/CaseA.kt"], &DifferentiateParams::default());
    assert!(affected(&result).contains("a/Sealed.kt"));
}

#[test]
fn test_class_leaving_sealed_hierarchy() {
    let graph = sealed_graph();
    let case_a = kotlin_class("a/CaseA", JvmFlags::PUBLIC | JvmFlags::FINAL);
    let result = round(&graph, vec![("a/CaseA.kt", vec![case_a])], &[], &DifferentiateParams::default());
    assert!(affected(&result).contains("a/Sealed.kt"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthetic Properties
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_field_shadowing_synthetic_property() {
    let foo = JvmClass::new("a/Foo", JvmFlags::PUBLIC)
        .with_method(method("getBar", JvmFlags::PUBLIC, vec![], string()));
    let user = kotlin_class("b/FooUserKt", JvmFlags::PUBLIC | JvmFlags::FINAL)
        .with_usage(Usage::class("a/Foo"))
        .with_usage(Usage::method("a/Foo", "getBar", "()Ljava/lang/String;"));
    let graph = graph_of(vec![("a/Foo.java", vec![foo.clone()]), ("b/FooUser.kt", vec![user])]);

    let foo = foo.with_field(JvmField::new("bar", JvmFlags::PUBLIC, string()));
    let result = round(&graph, vec![("a/Foo.java", vec![foo])], &[], &DifferentiateParams::default());

    assert_eq!(affected(&result), BTreeSet::from(["b/FooUser.kt"]));
}

#[test]
fn test_removed_getter_affects_setter_users() {
    let boolean = TypeRepr::new("Z");
    let task = JvmClass::new("a/Task", JvmFlags::PUBLIC)
        .with_method(method("isDone", JvmFlags::PUBLIC, vec![], boolean.clone()))
        .with_method(method("setDone", JvmFlags::PUBLIC, vec![boolean.clone()], TypeRepr::void()));
    let writer = kotlin_class("b/Writer", JvmFlags::PUBLIC).with_usage(Usage::method("a/Task", "setDone", "(Z)V"));
    let graph = graph_of(vec![("a/Task.java", vec![task]), ("b/Writer.kt", vec![writer])]);

    let task = JvmClass::new("a/Task", JvmFlags::PUBLIC)
        .with_method(method("setDone", JvmFlags::PUBLIC, vec![boolean], TypeRepr::void()));
    let result = round(&graph, vec![("a/Task.java", vec![task])], &[], &DifferentiateParams::default());

    assert!(affected(&result).contains("b/Writer.kt"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Extension Conflicts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_added_member_conflicts_with_extension_calls() {
    let a = JvmClass::new("a/A", JvmFlags::PUBLIC);
    let kotlin_caller = kotlin_class("b/ExtCaller", JvmFlags::PUBLIC)
        .with_usage(Usage::method("b/ExtensionsKt", "foo", "(La/A;)V"));
    let java_caller = JvmClass::new("c/JavaCaller", JvmFlags::PUBLIC)
        .with_usage(Usage::method("b/ExtensionsKt", "foo", "(La/A;)V"));
    let resolved = kotlin_class("d/Resolved", JvmFlags::PUBLIC).with_usage(Usage::method("a/A", "foo", "()V"));
    let graph = graph_of(vec![
        ("a/A.java", vec![a]),
        ("b/ExtCaller.kt", vec![kotlin_caller]),
        ("c/JavaCaller.java", vec![java_caller]),
        ("d/Resolved.kt", vec![resolved]),
    ]);

    let a = JvmClass::new("a/A", JvmFlags::PUBLIC).with_method(method("foo", JvmFlags::PUBLIC, vec![], TypeRepr::void()));
    let result = round(&graph, vec![("a/A.java", vec![a])], &[], &DifferentiateParams::default());

    let sources = affected(&result);
    assert!(sources.contains("b/ExtCaller.kt"));
    assert!(!sources.contains("c/JavaCaller.java"));
    assert!(!sources.contains("d/Resolved.kt"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Annotations
// ─────────────────────────────────────────────────────────────────────────────

fn annotated_graph(flags: JvmFlags) -> (Graph, JvmClass) {
    let api = JvmClass::new("a/Api", JvmFlags::PUBLIC).with_method(method("find", flags, vec![], string()));
    let sub = JvmClass::new("a/ApiImpl", JvmFlags::PUBLIC).with_super("a/Api");
    let caller = kotlin_class("b/Caller", JvmFlags::PUBLIC)
        .with_usage(Usage::class("a/Api"))
        .with_usage(Usage::method("a/Api", "find", "()Ljava/lang/String;"));
    let graph = graph_of(vec![
        ("a/Api.java", vec![api]),
        ("a/ApiImpl.java", vec![sub]),
        ("b/Caller.kt", vec![caller]),
    ]);
    let changed = JvmClass::new("a/Api", JvmFlags::PUBLIC).with_method(
        method("find", flags, vec![], string()).with_annotation("org/jetbrains/annotations/Nullable"),
    );
    (graph, changed)
}

#[test]
fn test_final_method_nullability_affects_usages_only() {
    let (graph, api) = annotated_graph(JvmFlags::PUBLIC | JvmFlags::FINAL);
    let result = round(&graph, vec![("a/Api.java", vec![api])], &[], &DifferentiateParams::default());
    assert_eq!(affected(&result), BTreeSet::from(["b/Caller.kt"]));
}

#[test]
fn test_open_method_nullability_affects_subclasses() {
    let (graph, api) = annotated_graph(JvmFlags::PUBLIC);
    let result = round(&graph, vec![("a/Api.java", vec![api])], &[], &DifferentiateParams::default());
    assert_eq!(affected(&result), BTreeSet::from(["a/ApiImpl.java", "b/Caller.kt"]));
}

#[test]
fn test_untracked_annotation_has_no_effect() {
    let api = JvmClass::new("a/Api", JvmFlags::PUBLIC).with_method(method("find", JvmFlags::PUBLIC, vec![], string()));
    let caller = JvmClass::new("b/Caller", JvmFlags::PUBLIC).with_usage(Usage::method("a/Api", "find", "()Ljava/lang/String;"));
    let graph = graph_of(vec![("a/Api.java", vec![api]), ("b/Caller.java", vec![caller])]);

    let api = JvmClass::new("a/Api", JvmFlags::PUBLIC).with_method(
        method("find", JvmFlags::PUBLIC, vec![], string()).with_annotation("java/lang/Deprecated"),
    );
    let result = round(&graph, vec![("a/Api.java", vec![api])], &[], &DifferentiateParams::default());
    assert!(result.affected_sources.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Hierarchy Queries
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_subclasses_without_override() {
    let run = method("run", JvmFlags::PUBLIC, vec![], TypeRepr::void());
    let graph = graph_of(vec![
        ("A.java", vec![JvmClass::new("A", JvmFlags::PUBLIC).with_method(run.clone())]),
        ("B.java", vec![JvmClass::new("B", JvmFlags::PUBLIC).with_super("A").with_method(run.clone())]),
        ("C.java", vec![JvmClass::new("C", JvmFlags::PUBLIC).with_super("B")]),
    ]);
    let utils = Utils::present(&graph);
    assert_eq!(
        utils.collect_subclasses_without_method(&ReferenceId::new("A"), &run),
        BTreeSet::from([ReferenceId::new("C")])
    );
}

#[test]
fn test_fun_interface_lambda_target() {
    let mut meta = KotlinMeta::class("a/Handler");
    meta.kind = KmClassKind::FunInterface;
    let handler = JvmClass::new("a/Handler", JvmFlags::PUBLIC | JvmFlags::INTERFACE | JvmFlags::ABSTRACT)
        .with_kotlin(KotlinMeta::Class(meta))
        .with_method(method("handle", JvmFlags::PUBLIC | JvmFlags::ABSTRACT, vec![string()], TypeRepr::void()));
    let graph = graph_of(vec![("a/Handler.kt", vec![handler.clone()])]);
    assert!(Utils::present(&graph).is_lambda_target(&handler));
}

// ─────────────────────────────────────────────────────────────────────────────
// Pass Properties
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_idempotent_pass() {
    let graph = sealed_graph();
    let case_b = kotlin_class("a/CaseB", JvmFlags::PUBLIC | JvmFlags::FINAL).with_super("a/Sealed");
    let params = DifferentiateParams::default();

    let first = round(&graph, vec![("a/CaseB.kt", vec![case_b.clone()])], &[], &params);
    let second = round(&graph, vec![("a/CaseB.kt", vec![case_b])], &[], &params);

    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[test]
fn test_affection_filter_excludes_sources() {
    let graph = sealed_graph();
    let params = DifferentiateParams::default().exclude(r"^a/Sealed\.kt$").unwrap();
    let result = round(&graph, Vec::new(), &["a/CaseA.kt"], &params);
    assert!(!affected(&result).contains("a/Sealed.kt"));
}

#[test]
fn test_generated_node_forces_rebuild() {
    let foo = JvmClass::new("a/Foo", JvmFlags::PUBLIC)
        .with_method(method("run", JvmFlags::PUBLIC, vec![], TypeRepr::void()));
    let generated = JvmClass::new("a/Foo_Factory", JvmFlags::PUBLIC | JvmFlags::GENERATED)
        .with_usage(Usage::method("a/Foo", "run", "()V"));
    let graph = graph_of(vec![("a/Foo.java", vec![foo]), ("gen/a/Foo_Factory.java", vec![generated])]);

    let foo = JvmClass::new("a/Foo", JvmFlags::PUBLIC);
    let result = round(&graph, vec![("a/Foo.java", vec![foo])], &[], &DifferentiateParams::default());
    assert!(!result.is_incremental());
}

#[test]
fn test_graph_commit_then_quiet_round() {
    let mut graph = sealed_graph();
    let case_b = kotlin_class("a/CaseB", JvmFlags::PUBLIC | JvmFlags::FINAL).with_super("a/Sealed");
    let mut delta = Delta::new(&graph, vec![src("a/CaseB.kt")], Vec::new());
    delta.associate(&graph, src("a/CaseB.kt"), vec![case_b.clone()]);
    let digest_before = graph.digest();
    graph.apply(&delta);
    assert_ne!(graph.digest(), digest_before);

    let result = round(&graph, vec![("a/CaseB.kt", vec![case_b])], &[], &DifferentiateParams::default());
    assert!(result.affected_sources.is_empty());
}

#[test]
fn test_source_joining_round_reports_removed_class_users() {
    let graph = graph_of(vec![
        (
            "a/Foo.java",
            vec![JvmClass::new("a/Foo", JvmFlags::PUBLIC), JvmClass::new("a/Bar", JvmFlags::PUBLIC)],
        ),
        ("b/Caller.java", vec![JvmClass::new("b/Caller", JvmFlags::PUBLIC).with_usage(Usage::class("a/Bar"))]),
    ]);
    let params = DifferentiateParams::default();

    let declared = round(&graph, vec![("a/Foo.java", vec![JvmClass::new("a/Foo", JvmFlags::PUBLIC)])], &[], &params);

    let mut delta = Delta::new(&graph, Vec::new(), Vec::new());
    delta.associate(&graph, src("a/Foo.java"), vec![JvmClass::new("a/Foo", JvmFlags::PUBLIC)]);
    let joined = differentiate(&graph, &delta, &params);

    assert_eq!(affected(&declared), BTreeSet::from(["b/Caller.java"]));
    assert_eq!(joined.affected_sources, declared.affected_sources);
}
