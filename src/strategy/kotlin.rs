//! Kotlin-aware rules layered on top of the JVM-generic ones.
//!
//! Kotlin resolves names differently from javac: extension functions compete
//! with members, synthetic properties map onto Java accessors, `when` over a
//! sealed hierarchy must stay exhaustive, and inline bodies are copied into
//! call sites. Every rule here only adds affected items.

use std::collections::BTreeSet;

use super::{affect_method_usages, ClassChange, FieldChange, JvmDifferentiateStrategy, MethodChange};
use crate::context::{DifferentiateContext, UsageConstraint};
use crate::kjvm;
use crate::types::{JvmClass, JvmField, JvmMemberSignature, JvmMethod, ReferenceId, TypeRepr, Usage};
use crate::utils::Utils;

/// Overlay for Kotlin name resolution, sealed hierarchies and inline functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct KotlinAwareStrategy;

impl KotlinAwareStrategy {
    /// New overlay.
    pub fn new() -> Self {
        Self
    }
}

/// Sealed classes among the transitive supertypes of `cls`.
fn sealed_supertypes(utils: &Utils<'_>, cls: &JvmClass) -> BTreeSet<ReferenceId> {
    utils
        .all_supertypes(&cls.id)
        .into_iter()
        .filter(|id| utils.get_nodes(id).iter().any(|n| kjvm::is_sealed(n)))
        .collect()
}

fn find_by_signature<'c>(cls: &'c JvmClass, signature: &JvmMemberSignature) -> Option<&'c JvmMethod> {
    cls.methods
        .iter()
        .find(|m| signature.matches(&m.name, &m.descriptor()))
}

/// Class declared private in Kotlin or on the JVM.
fn is_private_class(cls: &JvmClass) -> bool {
    cls.is_private()
        || cls
            .kotlin_meta()
            .and_then(|m| m.as_class())
            .map_or(false, |c| c.visibility.is_private())
}

/// Affect Kotlin call sites where a new member `method` of `cls` may now win
/// over an extension function with the same name.
///
/// Usages already resolved against `cls`, its supertypes or the subclasses
/// that inherit the member are unaffected. Nodes declaring a type alias with
/// the member's name are affected too.
pub(crate) fn affect_conflicting_extension_methods(
    ctx: &mut DifferentiateContext<'_>,
    future: &Utils<'_>,
    cls: &JvmClass,
    method: &JvmMethod,
) {
    let name = kjvm::kotlin_name(cls, method).unwrap_or(&method.name).to_string();
    let mut targets = future.all_supertypes(&cls.id);
    targets.extend(future.collect_subclasses_without_method(&cls.id, method));
    targets.insert(cls.id.clone());

    let aliasing: Vec<ReferenceId> = future
        .all_nodes()
        .filter(|(_, node)| kjvm::type_aliases(node).iter().any(|a| a.name == name))
        .map(|(_, node)| node.id.clone())
        .collect();
    for id in aliasing {
        tracing::debug!(class = %cls.id, node = %id, alias = %name, "Affect node declaring a clashing type alias");
        ctx.affect_node(id);
    }

    tracing::debug!(class = %cls.id, method = %name, targets = targets.len(), "Affect conflicting extension usages");
    ctx.affect_usage_query("conflicting extension", move |node, usage| match usage {
        Usage::Method { owner, name: n, .. } => *n == name && !targets.contains(owner) && kjvm::is_kotlin_node(node),
        _ => false,
    });
}

/// Affect getter and setter usages of synthetic properties of `cls` and its
/// supertypes named like `field`.
fn affect_property_accessors(ctx: &mut DifferentiateContext<'_>, future: &Utils<'_>, cls: &JvmClass, field: &JvmField) {
    let supertypes: Vec<&JvmClass> = future
        .all_supertypes(&cls.id)
        .iter()
        .flat_map(|id| future.get_nodes(id))
        .collect();
    for node in std::iter::once(cls).chain(supertypes) {
        for property in kjvm::find_properties(node) {
            if !kjvm::property_matches_field(&property.name, &field.name) {
                continue;
            }
            tracing::debug!(class = %cls.id, field = %field.name, property = %property.name, "Field may shadow a synthetic property");
            affect_method_usages(ctx, future, &cls.id, property.getter);
            if let Some(setter) = property.setter {
                affect_method_usages(ctx, future, &cls.id, setter);
            }
        }
    }
}

impl JvmDifferentiateStrategy for KotlinAwareStrategy {
    fn name(&self) -> &'static str {
        "kotlin"
    }

    fn process_added_class<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        added: &'a JvmClass,
        future: &Utils<'a>,
        _present: &Utils<'a>,
    ) -> bool {
        for sealed in sealed_supertypes(future, added) {
            tracing::debug!(class = %added.id, sealed = %sealed, "Subclass of a sealed class added");
            ctx.affect_node(sealed);
        }

        if added.is_top_level() && !is_private_class(added) {
            let short_name = added.short_name().to_string();
            let package = added.package_name().to_string();
            ctx.affect_usage_query("top-level name clash", move |node, usage| match usage {
                Usage::Method { owner, name, .. } => {
                    let constructor_clash = name == "<init>"
                        && owner.package_name() != package
                        && owner.name().rsplit('/').next() == Some(short_name.as_str());
                    kjvm::is_kotlin_node(node) && (*name == short_name || constructor_clash)
                }
                Usage::ImportPackageOnDemand { package: p } => {
                    *p == package && kjvm::has_on_demand_import_conflict(node, &short_name, &package)
                }
                _ => false,
            });
        }
        true
    }

    fn process_removed_class<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        removed: &'a JvmClass,
        _future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        for sealed in sealed_supertypes(present, removed) {
            tracing::debug!(class = %removed.id, sealed = %sealed, "Subclass of a sealed class removed");
            ctx.affect_node(sealed);
        }
        true
    }

    fn process_changed_class<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        let (past, now, diff) = (change.past, change.now, &change.diff);
        let id = &now.id;

        if diff.supertypes_changed() {
            let before = sealed_supertypes(present, past);
            let after = sealed_supertypes(future, now);
            for sealed in before.symmetric_difference(&after) {
                tracing::debug!(class = %id, sealed = %sealed, "Sealed hierarchy membership changed");
                ctx.affect_node(sealed.clone());
            }
        }

        if !present.is_lambda_target(past) && future.is_lambda_target(now) {
            let this_type = TypeRepr::class(now.name());
            for dependent in present.get_depending_nodes(id) {
                for node in future.get_nodes(&dependent) {
                    for method in node.methods.iter().filter(|m| m.arg_types.contains(&this_type)) {
                        tracing::debug!(class = %id, dependent = %node.id, method = %method.name, "Became a lambda target");
                        affect_conflicting_extension_methods(ctx, future, node, method);
                    }
                }
            }
        }

        for function in diff.kotlin.functions.changed() {
            if function.now.visibility.is_private() || !function.diff.nullability_changed() {
                continue;
            }
            let Some(signature) = &function.now.jvm_signature else {
                continue;
            };
            if let Some(method) = find_by_signature(now, signature) {
                if !kjvm::is_declared_private(now, method) {
                    tracing::debug!(class = %id, function = %function.now.name, "Function nullability changed");
                    affect_method_usages(ctx, future, id, method);
                }
            }
        }

        for property in diff.kotlin.properties.changed() {
            if property.now.visibility.is_private() {
                continue;
            }
            let accessor = if property.diff.became_not_null() {
                property.now.getter.as_ref()
            } else if property.diff.became_nullable() {
                property.now.setter.as_ref()
            } else {
                None
            };
            if let Some(method) = accessor.and_then(|sig| find_by_signature(now, sig)) {
                tracing::debug!(class = %id, property = %property.now.name, accessor = %method.name, "Property nullability changed");
                affect_method_usages(ctx, future, id, method);
            }
        }
        true
    }

    fn process_added_method<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        added: &'a JvmMethod,
        future: &Utils<'a>,
        _present: &Utils<'a>,
    ) -> bool {
        let cls = change.now;

        if added.name == "invoke" && !cls.is_private() && kjvm::is_operator(cls, added) {
            for id in future.with_all_subclasses(&cls.id) {
                tracing::debug!(class = %id, "Operator invoke added, affecting Kotlin instantiations");
                ctx.affect_usage_with(Usage::class_new(id), UsageConstraint::KotlinNodes);
            }
        }

        if !added.is_constructor() {
            affect_conflicting_extension_methods(ctx, future, cls, added);
        }
        true
    }

    fn process_removed_method<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        removed: &'a JvmMethod,
        future: &Utils<'a>,
        _present: &Utils<'a>,
    ) -> bool {
        let cls = change.past;
        let mut setters: Vec<&JvmMethod> = kjvm::find_properties(cls)
            .into_iter()
            .filter(|p| p.getter.is_same(removed))
            .filter_map(|p| p.setter)
            .collect();
        if let Some(setter) = kjvm::km_property(cls, removed)
            .filter(|p| p.getter.as_ref().map_or(false, |g| g.matches(&removed.name, &removed.descriptor())))
            .and_then(|p| p.setter.as_ref())
            .and_then(|sig| find_by_signature(cls, sig))
        {
            setters.push(setter);
        }
        for setter in setters {
            tracing::debug!(class = %cls.id, getter = %removed.name, setter = %setter.name, "Getter removed, affecting setter usages");
            affect_method_usages(ctx, future, &cls.id, setter);
        }
        true
    }

    fn process_changed_method<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        method: &MethodChange<'a>,
        future: &Utils<'a>,
        _present: &Utils<'a>,
    ) -> bool {
        let cls = change.now;
        if cls.is_annotation() || !method.diff.value_changed() {
            return true;
        }
        let now = method.now;
        if !kjvm::is_inlined_at_call_sites(cls, now) && !kjvm::is_inlined_at_call_sites(change.past, method.past) {
            return true;
        }
        let name = kjvm::kotlin_name(cls, now).unwrap_or(&now.name).to_string();
        tracing::debug!(class = %cls.id, method = %name, "Inlined value changed");

        ctx.affect_usage(kjvm::lookup_usage(cls, now));
        for sub in future.collect_subclasses_without_method(&cls.id, now) {
            for node in future.get_nodes(&sub) {
                ctx.affect_usage(Usage::lookup(kjvm::lookup_scope(node), name.clone()));
            }
        }
        affect_method_usages(ctx, future, &cls.id, now);
        true
    }

    fn process_added_field<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        added: &'a JvmField,
        future: &Utils<'a>,
        _present: &Utils<'a>,
    ) -> bool {
        if !added.is_private() {
            affect_property_accessors(ctx, future, change.now, added);
        }
        true
    }

    fn process_changed_field<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        field: &FieldChange<'a>,
        future: &Utils<'a>,
        _present: &Utils<'a>,
    ) -> bool {
        if field.diff.access_expanded() && !field.now.is_private() {
            affect_property_accessors(ctx, future, change.now, field.now);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Delta;
    use crate::graph::Graph;
    use crate::params::DifferentiateParams;
    use crate::types::{JvmFlags, KotlinMeta, Modality, NodeSource};

    fn sealed(name: &str) -> JvmClass {
        let mut meta = KotlinMeta::class(name);
        meta.modality = Modality::Sealed;
        JvmClass::new(name, JvmFlags::PUBLIC | JvmFlags::ABSTRACT).with_kotlin(KotlinMeta::Class(meta))
    }

    #[test]
    fn test_sealed_supertypes_are_transitive() {
        let mut graph = Graph::new();
        graph.add_source(NodeSource::new("a/Shape.kt"), vec![sealed("a/Shape")]);
        graph.add_source(
            NodeSource::new("a/Polygon.kt"),
            vec![JvmClass::new("a/Polygon", JvmFlags::PUBLIC | JvmFlags::ABSTRACT).with_super("a/Shape")],
        );
        let square = JvmClass::new("a/Square", JvmFlags::PUBLIC).with_super("a/Polygon");
        let utils = Utils::present(&graph);
        assert_eq!(sealed_supertypes(&utils, &square), BTreeSet::from([ReferenceId::new("a/Shape")]));
    }

    #[test]
    fn test_type_alias_nodes_affected_by_added_member() {
        let alias_holder = JvmClass::new("b/AliasesKt", JvmFlags::PUBLIC | JvmFlags::FINAL).with_kotlin(KotlinMeta::Package(
            crate::types::KmPackage {
                type_aliases: vec![crate::types::KmTypeAlias {
                    name: "render".to_string(),
                    visibility: crate::types::Visibility::Public,
                }],
                ..Default::default()
            },
        ));
        let view = JvmClass::new("a/View", JvmFlags::PUBLIC);
        let mut graph = Graph::new();
        graph.add_source(NodeSource::new("a/View.java"), vec![view.clone()]);
        graph.add_source(NodeSource::new("b/Aliases.kt"), vec![alias_holder]);

        let mut delta = Delta::new(&graph, vec![NodeSource::new("a/View.java")], Vec::new());
        delta.associate(
            &graph,
            NodeSource::new("a/View.java"),
            vec![view.with_method(JvmMethod::new("render", JvmFlags::PUBLIC, vec![], TypeRepr::void()))],
        );
        let params = DifferentiateParams::default();
        let future = Utils::future(&graph, &delta);
        let mut ctx = DifferentiateContext::new(&graph, &delta, &params);
        let cls = &delta.nodes_after_of(&NodeSource::new("a/View.java"))[0];
        affect_conflicting_extension_methods(&mut ctx, &future, cls, &cls.methods[0]);
        let result = ctx.finish(&future);
        assert!(result.affected_sources.contains(&NodeSource::new("b/Aliases.kt")));
    }
}
