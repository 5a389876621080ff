//! Hierarchy and lookup queries over one side of a round.
//!
//! A [`Utils`] views either the *present* (the committed graph) or the
//! *future* (the graph with the round's compiled and deleted sources replaced
//! by the delta's new nodes). Queries for ids the view does not know, such as
//! library classes, return empty results.
//!
//! The direct-subclass index is built once per instance on first use and
//! reused for every query of the round.

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::delta::Delta;
use crate::graph::Graph;
use crate::types::{JvmClass, JvmMethod, NodeSource, ReferenceId, OBJECT_CLASS_NAME};

/// Query façade over the graph, optionally overlaid with a delta.
#[derive(Debug)]
pub struct Utils<'a> {
    graph: &'a Graph,
    delta: Option<&'a Delta>,
    subclasses: OnceCell<BTreeMap<ReferenceId, BTreeSet<ReferenceId>>>,
}

impl<'a> Utils<'a> {
    /// View of the committed graph.
    pub fn present(graph: &'a Graph) -> Self {
        Self { graph, delta: None, subclasses: OnceCell::new() }
    }

    /// View of the graph as it will be once the delta is committed.
    ///
    /// A source-only delta carries no new nodes, so its future equals the present.
    pub fn future(graph: &'a Graph, delta: &'a Delta) -> Self {
        let delta = (!delta.is_source_only()).then_some(delta);
        Self { graph, delta, subclasses: OnceCell::new() }
    }

    fn is_replaced(&self, source: &NodeSource) -> bool {
        self.delta
            .map_or(false, |d| d.is_compiled(source) || d.is_deleted(source))
    }

    /// Every node in the view with its defining source.
    pub fn all_nodes(&self) -> impl Iterator<Item = (&'a NodeSource, &'a JvmClass)> + '_ {
        let graph = self.graph;
        let committed = graph.all_nodes().filter(move |(s, _)| !self.is_replaced(s));
        let produced = self.delta.into_iter().flat_map(Delta::nodes_after_by_source);
        committed.chain(produced)
    }

    /// Nodes with the id.
    pub fn get_nodes(&self, id: &ReferenceId) -> Vec<&'a JvmClass> {
        let graph = self.graph;
        let mut nodes: Vec<&'a JvmClass> = graph
            .get_sources(id)
            .filter(|s| !self.is_replaced(s))
            .flat_map(|s| graph.nodes_of_source(s))
            .filter(|n| &n.id == id)
            .collect();
        if let Some(delta) = self.delta {
            nodes.extend(
                delta
                    .sources_after(id)
                    .flat_map(|s| delta.nodes_after_of(s))
                    .filter(|n| &n.id == id),
            );
        }
        nodes
    }

    /// Sources defining the id.
    pub fn get_node_sources(&self, id: &ReferenceId) -> BTreeSet<NodeSource> {
        let mut sources: BTreeSet<NodeSource> = self
            .graph
            .get_sources(id)
            .filter(|s| !self.is_replaced(s))
            .cloned()
            .collect();
        if let Some(delta) = self.delta {
            sources.extend(delta.sources_after(id).cloned());
        }
        sources
    }

    /// Ids of nodes that record a usage owned by `id`.
    pub fn get_depending_nodes(&self, id: &ReferenceId) -> BTreeSet<ReferenceId> {
        let mut deps: BTreeSet<ReferenceId> = self.graph.get_depending_nodes(id).cloned().collect();
        if let Some(delta) = self.delta {
            for node in delta.nodes_after() {
                if &node.id != id && node.usages.iter().any(|u| &u.element_owner() == id) {
                    deps.insert(node.id.clone());
                }
            }
        }
        deps
    }

    /// Ids of classes with the given short name.
    pub fn classes_by_short_name(&self, short_name: &str) -> BTreeSet<ReferenceId> {
        let mut ids: BTreeSet<ReferenceId> = self
            .graph
            .classes_by_short_name(short_name)
            .filter(|id| !self.get_nodes(id).is_empty())
            .cloned()
            .collect();
        if let Some(delta) = self.delta {
            ids.extend(
                delta
                    .nodes_after()
                    .filter(|n| n.short_name() == short_name)
                    .map(|n| n.id.clone()),
            );
        }
        ids
    }

    /// Resolved direct supertypes: super class and interfaces known to the view.
    pub fn all_direct_supertypes(&self, cls: &JvmClass) -> Vec<&'a JvmClass> {
        cls.super_types()
            .flat_map(|name| self.get_nodes(&ReferenceId::new(name)))
            .collect()
    }

    /// Transitive supertypes of `id`.
    ///
    /// Names that cannot be resolved are included but not traversed further.
    pub fn all_supertypes(&self, id: &ReferenceId) -> BTreeSet<ReferenceId> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for node in self.get_nodes(&current) {
                for name in node.super_types() {
                    let sup = ReferenceId::new(name);
                    if visited.insert(sup.clone()) {
                        queue.push_back(sup);
                    }
                }
            }
        }
        visited.remove(id);
        visited
    }

    fn subclass_index(&self) -> &BTreeMap<ReferenceId, BTreeSet<ReferenceId>> {
        self.subclasses.get_or_init(|| {
            let mut index: BTreeMap<ReferenceId, BTreeSet<ReferenceId>> = BTreeMap::new();
            for (_, node) in self.all_nodes() {
                for name in node.super_types() {
                    index.entry(ReferenceId::new(name)).or_default().insert(node.id.clone());
                }
            }
            tracing::trace!(entries = index.len(), "Built subclass index");
            index
        })
    }

    /// Direct subclasses and implementors of `id`.
    pub fn direct_subclasses(&self, id: &ReferenceId) -> impl Iterator<Item = &ReferenceId> {
        self.subclass_index().get(id).into_iter().flatten()
    }

    /// Transitive subclasses of `id`, not including `id`.
    pub fn all_subclasses(&self, id: &ReferenceId) -> BTreeSet<ReferenceId> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for sub in self.direct_subclasses(&current) {
                if visited.insert(sub.clone()) {
                    queue.push_back(sub.clone());
                }
            }
        }
        visited.remove(id);
        visited
    }

    /// `id` and its transitive subclasses.
    pub fn with_all_subclasses(&self, id: &ReferenceId) -> BTreeSet<ReferenceId> {
        let mut ids = self.all_subclasses(id);
        ids.insert(id.clone());
        ids
    }

    /// Transitive subclasses of `owner` that do not declare `method` themselves.
    pub fn collect_subclasses_without_method(&self, owner: &ReferenceId, method: &JvmMethod) -> BTreeSet<ReferenceId> {
        self.all_subclasses(owner)
            .into_iter()
            .filter(|sub| sub != owner)
            .filter(|sub| self.get_nodes(sub).iter().all(|n| n.find_method(method).is_none()))
            .collect()
    }

    /// Transitive subclasses of `owner` that do not declare a field named `name`.
    pub fn collect_subclasses_without_field(&self, owner: &ReferenceId, name: &str) -> BTreeSet<ReferenceId> {
        self.all_subclasses(owner)
            .into_iter()
            .filter(|sub| sub != owner)
            .filter(|sub| {
                self.get_nodes(sub)
                    .iter()
                    .all(|n| n.fields.iter().all(|f| f.name != name))
            })
            .collect()
    }

    /// Whether `id` transitively extends or implements `root`.
    pub fn is_inheritor(&self, id: &ReferenceId, root: &ReferenceId) -> bool {
        self.all_supertypes(id).contains(root)
    }

    /// Functional interface: an interface with exactly one abstract method,
    /// counting abstract methods inherited from its super interfaces.
    pub fn is_lambda_target(&self, cls: &JvmClass) -> bool {
        if !cls.is_interface() || cls.is_annotation() {
            return false;
        }
        let mut abstract_methods: Vec<&JvmMethod> = Vec::new();
        let inherited = self
            .all_supertypes(&cls.id)
            .into_iter()
            .flat_map(|id| self.get_nodes(&id))
            .filter(|n| n.is_interface());
        let hierarchy = std::iter::once(cls).chain(inherited.collect::<Vec<_>>());
        for node in hierarchy {
            for m in node.methods.iter().filter(|m| m.is_abstract() && !m.is_static()) {
                if !abstract_methods.iter().any(|seen| seen.is_same_by_java_rules(m)) {
                    abstract_methods.push(m);
                }
            }
        }
        abstract_methods.len() == 1
    }

    /// Whether the id names a functional interface known to the view.
    pub fn is_lambda_target_id(&self, id: &ReferenceId) -> bool {
        self.get_nodes(id).iter().any(|n| self.is_lambda_target(n))
    }

    /// Methods in subclasses of `cls` that override `method`.
    pub fn get_overriding_methods(&self, cls: &JvmClass, method: &JvmMethod) -> Vec<(&'a JvmClass, &'a JvmMethod)> {
        let mut found = Vec::new();
        for sub in self.all_subclasses(&cls.id) {
            for node in self.get_nodes(&sub) {
                found.extend(
                    node.methods
                        .iter()
                        .filter(|m| !m.is_private() && m.is_same_by_java_rules(method))
                        .map(|m| (node, m)),
                );
            }
        }
        found
    }

    /// Methods in supertypes of `cls` matching the predicate.
    pub fn get_overridden_methods(
        &self,
        cls: &JvmClass,
        predicate: impl Fn(&JvmMethod) -> bool,
    ) -> Vec<(&'a JvmClass, &'a JvmMethod)> {
        let mut found = Vec::new();
        for sup in self.all_supertypes(&cls.id) {
            for node in self.get_nodes(&sup) {
                found.extend(node.methods.iter().filter(|&m| predicate(m)).map(|m| (node, m)));
            }
        }
        found
    }

    /// Whether a supertype declares a non-private method `method` overrides.
    pub fn has_overridden_methods(&self, cls: &JvmClass, method: &JvmMethod) -> bool {
        !self
            .get_overridden_methods(cls, |m| !m.is_private() && m.is_same_by_java_rules(method))
            .is_empty()
    }

    /// Some supertype of `cls` other than `java/lang/Object` is unknown to the view.
    pub fn inherits_from_library_class(&self, cls: &JvmClass) -> bool {
        self.all_supertypes(&cls.id)
            .iter()
            .any(|id| id.name() != OBJECT_CLASS_NAME && self.get_nodes(id).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JvmFlags, TypeRepr};

    fn run() -> JvmMethod {
        JvmMethod::new("run", JvmFlags::PUBLIC, vec![], TypeRepr::void())
    }

    /// `A <- B <- C` where `B` overrides `run`.
    fn hierarchy() -> Graph {
        let mut graph = Graph::new();
        graph.add_source(
            NodeSource::new("A.java"),
            vec![JvmClass::new("A", JvmFlags::PUBLIC).with_method(run())],
        );
        graph.add_source(
            NodeSource::new("B.java"),
            vec![JvmClass::new("B", JvmFlags::PUBLIC).with_super("A").with_method(run())],
        );
        graph.add_source(
            NodeSource::new("C.java"),
            vec![JvmClass::new("C", JvmFlags::PUBLIC).with_super("B")],
        );
        graph
    }

    #[test]
    fn test_subclasses_without_method() {
        let graph = hierarchy();
        let utils = Utils::present(&graph);
        let result = utils.collect_subclasses_without_method(&ReferenceId::new("A"), &run());
        assert_eq!(result, BTreeSet::from([ReferenceId::new("C")]));
    }

    #[test]
    fn test_supertypes_and_subclasses() {
        let graph = hierarchy();
        let utils = Utils::present(&graph);
        let supers = utils.all_supertypes(&ReferenceId::new("C"));
        assert!(supers.contains(&ReferenceId::new("A")));
        assert!(supers.contains(&ReferenceId::new(OBJECT_CLASS_NAME)));
        assert_eq!(utils.with_all_subclasses(&ReferenceId::new("A")).len(), 3);
        assert!(utils.is_inheritor(&ReferenceId::new("C"), &ReferenceId::new("A")));
    }

    #[test]
    fn test_cycle_terminates() {
        let mut graph = Graph::new();
        graph.add_source(NodeSource::new("X.java"), vec![JvmClass::new("X", JvmFlags::PUBLIC).with_super("Y")]);
        graph.add_source(NodeSource::new("Y.java"), vec![JvmClass::new("Y", JvmFlags::PUBLIC).with_super("X")]);
        let utils = Utils::present(&graph);
        assert_eq!(utils.all_supertypes(&ReferenceId::new("X")), BTreeSet::from([ReferenceId::new("Y")]));
        assert_eq!(utils.all_subclasses(&ReferenceId::new("X")), BTreeSet::from([ReferenceId::new("Y")]));
    }

    #[test]
    fn test_future_view_replaces_compiled_sources() {
        let graph = hierarchy();
        let mut delta = Delta::new(&graph, [NodeSource::new("C.java")], Vec::new());
        delta.associate(
            &graph,
            NodeSource::new("C.java"),
            vec![JvmClass::new("C", JvmFlags::PUBLIC).with_super("A")],
        );
        let present = Utils::present(&graph);
        let future = Utils::future(&graph, &delta);
        let b = ReferenceId::new("B");
        assert_eq!(present.direct_subclasses(&b).count(), 1);
        assert_eq!(future.direct_subclasses(&b).count(), 0);
        assert_eq!(future.get_nodes(&ReferenceId::new("C")).len(), 1);
    }

    #[test]
    fn test_lambda_target() {
        let sam = JvmClass::new("Fn", JvmFlags::PUBLIC | JvmFlags::INTERFACE | JvmFlags::ABSTRACT)
            .with_method(JvmMethod::new("apply", JvmFlags::PUBLIC | JvmFlags::ABSTRACT, vec![], TypeRepr::void()));
        let not_sam = sam
            .clone()
            .with_method(JvmMethod::new("other", JvmFlags::PUBLIC | JvmFlags::ABSTRACT, vec![], TypeRepr::void()));
        let graph = Graph::new();
        let utils = Utils::present(&graph);
        assert!(utils.is_lambda_target(&sam));
        assert!(!utils.is_lambda_target(&not_sam));
    }

    #[test]
    fn test_library_supertype() {
        let mut graph = Graph::new();
        let cls = JvmClass::new("a/MyList", JvmFlags::PUBLIC).with_super("java/util/AbstractList");
        graph.add_source(NodeSource::new("a/MyList.java"), vec![cls.clone()]);
        let utils = Utils::present(&graph);
        assert!(utils.inherits_from_library_class(&cls));
    }
}
