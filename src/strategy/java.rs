//! JVM-generic differentiation rules.
//!
//! Reacts to class, method and field changes by affecting the usages that
//! javac resolved against the changed element, plus the sources of classes
//! whose inheritance relation to it is no longer valid.

use std::collections::BTreeSet;

use super::{
    affect_field_usages, affect_lambda_instantiations, affect_method_usages, affect_subclasses, affect_usages, ClassChange, FieldChange,
    JvmDifferentiateStrategy, MethodChange,
};
use crate::annotations::AnnotationChangeTracker;
use crate::context::{DifferentiateContext, UsageConstraint};
use crate::types::{ElemType, JvmClass, JvmField, JvmFlags, JvmMethod, ReferenceId, RetentionPolicy, Usage};
use crate::utils::Utils;

/// Base strategy for classes compiled by any JVM language.
#[derive(Debug, Clone, Default)]
pub struct JavaDifferentiateStrategy {
    annotations: AnnotationChangeTracker,
}

impl JavaDifferentiateStrategy {
    /// Strategy tracking the built-in nullability annotations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategy with a custom annotation tracker.
    pub fn with_tracker(annotations: AnnotationChangeTracker) -> Self {
        Self { annotations }
    }
}

/// What a non-incremental change touched.
struct Exposure<'s> {
    public: bool,
    protected: bool,
    field: Option<&'s str>,
}

/// Give up on incremental compilation for a public element; otherwise soften
/// to recompiling the package and, for protected elements, the subclasses.
fn affect_on_non_incremental_change(
    ctx: &mut DifferentiateContext<'_>,
    present: &Utils<'_>,
    owner: &ReferenceId,
    exposure: Exposure<'_>,
    reason: String,
) {
    if exposure.public {
        ctx.request_non_incremental(reason);
        return;
    }
    if exposure.protected {
        let subclasses = match exposure.field {
            Some(name) => present.collect_subclasses_without_field(owner, name),
            None => present.all_subclasses(owner),
        };
        for id in subclasses {
            ctx.affect_node(id);
        }
    }
    let package = owner.package_name();
    tracing::debug!(class = %owner, package, "Softening non-incremental change to the package");
    let in_package: Vec<ReferenceId> = ctx
        .graph()
        .registered_nodes()
        .filter(|id| id.package_name() == package)
        .cloned()
        .collect();
    for id in in_package {
        ctx.affect_node(id);
    }
}

fn affect_static_on_demand_usages(ctx: &mut DifferentiateContext<'_>, owner: &ReferenceId, propagated: &BTreeSet<ReferenceId>) {
    affect_usages(ctx, owner, propagated, |id| Usage::ImportStaticOnDemand { owner: id.clone() }, None);
}

fn affect_static_import_usages(
    ctx: &mut DifferentiateContext<'_>,
    owner: &ReferenceId,
    name: &str,
    propagated: &BTreeSet<ReferenceId>,
) {
    affect_usages(
        ctx,
        owner,
        propagated,
        |id| Usage::ImportStaticMember { owner: id.clone(), name: name.to_string() },
        None,
    );
}

/// Affect every method usage named `name` resolved against one of `owners`.
fn affect_method_name_usages(ctx: &mut DifferentiateContext<'_>, owners: BTreeSet<ReferenceId>, name: String) {
    ctx.affect_usage_query("method name", move |_, usage| match usage {
        Usage::Method { owner, name: n, .. } => *n == name && owners.contains(owner),
        _ => false,
    });
}

fn protected_constraint(cls: &JvmClass) -> UsageConstraint {
    UsageConstraint::OutsidePackageNonInheritor {
        package: cls.package_name().to_string(),
        root: cls.id.clone(),
    }
}

fn package_constraint(cls: &JvmClass) -> UsageConstraint {
    UsageConstraint::OutsidePackage(cls.package_name().to_string())
}

impl JvmDifferentiateStrategy for JavaDifferentiateStrategy {
    fn name(&self) -> &'static str {
        "java"
    }

    fn process_removed_class<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        removed: &'a JvmClass,
        _future: &Utils<'a>,
        _present: &Utils<'a>,
    ) -> bool {
        tracing::debug!(class = %removed.id, "Removed class");
        ctx.affect_usage(Usage::class(removed.id.clone()));
        true
    }

    fn process_added_class<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        added: &'a JvmClass,
        _future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        if added.is_anonymous() || added.is_local() {
            return true;
        }

        if added.is_top_level() {
            let delta = ctx.delta();
            let duplicates: Vec<_> = present
                .get_node_sources(&added.id)
                .into_iter()
                .filter(|s| !delta.is_deleted(s) && !delta.is_compiled(s))
                .collect();
            if !duplicates.is_empty() {
                tracing::debug!(class = %added.id, sources = duplicates.len(), "Possibly duplicated class");
                for source in duplicates {
                    ctx.affect_node_source(source);
                }
                return true;
            }
        }

        let mut targets = present.classes_by_short_name(added.short_name());
        targets.insert(added.id.clone());
        for target in targets {
            for dependent in present.get_depending_nodes(&target) {
                tracing::debug!(class = %added.id, dependent = %dependent, "Affect dependent of a class with the same short name");
                ctx.affect_node(dependent);
            }
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
        let past = change.past;
        let id = &past.id;
        let diff = &change.diff;

        if diff.supertypes_changed() || diff.signature_changed() {
            let extends_changed = diff.super_class_changed() && !diff.extends_added();
            let affect_usages = diff.signature_changed() || extends_changed || !diff.interfaces.removed().is_empty();
            affect_subclasses(ctx, future, &change.now.id, affect_usages);

            if extends_changed {
                for dependent in present.get_depending_nodes(id) {
                    for node in present.get_nodes(&dependent) {
                        for method in node.methods.iter().filter(|m| m.exceptions.iter().any(|e| e == past.name())) {
                            tracing::debug!(class = %node.id, method = %method.name, "Affect usages of a method throwing the changed class");
                            ctx.affect_usage(method.create_usage(&node.id));
                        }
                    }
                }
            }

            if !past.is_anonymous() {
                let future_parents = future.all_supertypes(id);
                for lost in present.all_supertypes(id).difference(&future_parents) {
                    tracing::debug!(class = %id, parent = %lost, "Affect usages in generic bounds of a lost supertype");
                    ctx.affect_usage(Usage::ClassAsGenericBound { owner: lost.clone() });
                }
            }
        }

        let added = diff.added_flags();
        let removed = diff.removed_flags();

        if (added | removed).contains(JvmFlags::INTERFACE) {
            ctx.affect_usage(Usage::class(id.clone()));
        }

        if past.is_annotation() && past.retention_policy == Some(RetentionPolicy::Source) {
            affect_on_non_incremental_change(
                ctx,
                present,
                id,
                Exposure { public: past.flags.is_public(), protected: past.flags.is_protected(), field: None },
                format!("source-retained annotation {id} changed"),
            );
        }

        if added.is_protected() {
            ctx.affect_usage_with(Usage::class(id.clone()), protected_constraint(past));
        }

        if !past.flags.is_package_local() && change.now.flags.is_package_local() {
            ctx.affect_usage_with(Usage::class(id.clone()), package_constraint(past));
        }

        if added.is_final() || added.is_private() {
            ctx.affect_usage(Usage::class(id.clone()));
        }

        if added.is_abstract() || added.is_static() {
            ctx.affect_usage(Usage::class_new(id.clone()));
        }

        if !past.is_anonymous() && !past.is_private() && diff.flags_changed() && past.is_inner_class() {
            ctx.affect_usage(Usage::class(id.clone()));
        }

        if diff.permitted_subclasses_changed() {
            ctx.affect_usage(Usage::class(id.clone()));
        }

        if past.is_annotation() {
            if diff.retention_policy_changed() {
                ctx.affect_usage(Usage::class(id.clone()));
            } else {
                let removed_targets: BTreeSet<ElemType> = diff.annotation_targets.removed().iter().map(|t| **t).collect();

                if removed_targets.contains(&ElemType::LocalVariable) {
                    affect_on_non_incremental_change(
                        ctx,
                        present,
                        id,
                        Exposure { public: past.flags.is_public(), protected: past.flags.is_protected(), field: None },
                        format!("annotation {id} can no longer target local variables"),
                    );
                }

                if !removed_targets.is_empty() {
                    let annotation = id.clone();
                    ctx.affect_usage_query("annotation targets", move |_, usage| match usage {
                        Usage::Annotation { owner, targets, .. } => {
                            *owner == annotation && targets.iter().any(|t| removed_targets.contains(t))
                        }
                        _ => false,
                    });
                }

                if diff.methods.added().iter().any(|m| m.value.is_none()) {
                    tracing::debug!(class = %id, "Annotation attribute without default added");
                    ctx.affect_usage(Usage::class(id.clone()));
                }
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
        present: &Utils<'a>,
    ) -> bool {
        let cls = change.past;
        if cls.is_annotation() || added.is_private() {
            return true;
        }
        let id = &cls.id;

        if cls.is_interface() || cls.is_abstract() || added.is_abstract() {
            affect_subclasses(ctx, future, id, false);
        }
        if cls.is_interface() && added.is_abstract() {
            affect_lambda_instantiations(ctx, present, id);
        }

        let propagated = future.collect_subclasses_without_method(id, added);

        if !added.arg_types.is_empty() && !present.has_overridden_methods(cls, added) {
            tracing::debug!(class = %id, method = %added.name, "Added overload, affecting same-named method usages");
            let mut owners = BTreeSet::from([id.clone()]);
            if !added.is_constructor() {
                owners.extend(propagated.iter().cloned());
            }
            affect_method_name_usages(ctx, owners, added.name.clone());
        }

        if added.is_static() {
            affect_static_on_demand_usages(ctx, id, &propagated);
        }

        for (sub, overriding) in future.get_overriding_methods(cls, added) {
            if overriding.is_same(added) {
                ctx.affect_node(sub.id.clone());
            } else {
                tracing::debug!(class = %sub.id, method = %overriding.name, "Affect usages of a method with a different return type");
                let sub_propagated = present.collect_subclasses_without_method(&sub.id, overriding);
                affect_usages(ctx, &sub.id, &sub_propagated, |owner| overriding.create_usage(owner), None);
                ctx.affect_node(sub.id.clone());
            }
        }

        for sub in future.all_subclasses(id) {
            for node in future.get_nodes(&sub) {
                if node.outer_fq_name.is_empty() {
                    continue;
                }
                let outer = ReferenceId::new(node.outer_fq_name.clone());
                let shadows = future.get_nodes(&outer).iter().any(|o| {
                    future.inherits_from_library_class(o) || o.methods.iter().any(|m| m.name == added.name)
                });
                if shadows {
                    tracing::debug!(class = %sub, "Affect nested subclass due to local overriding");
                    ctx.affect_node(sub.clone());
                }
            }
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
        let id = &cls.id;
        let propagated = future.collect_subclasses_without_method(id, removed);

        if !removed.is_private() && removed.is_static() {
            affect_static_import_usages(ctx, id, &removed.name, &propagated);
        }

        if removed.is_package_local() {
            affect_usages(ctx, id, &propagated, |owner| removed.create_usage(owner), None);
        } else {
            let overridden = if removed.is_constructor() {
                Vec::new()
            } else {
                future.get_overridden_methods(cls, |m| m.is_same_by_java_rules(removed))
            };
            let clearly_overridden = removed.signature.is_empty()
                && !future.inherits_from_library_class(cls)
                && !overridden.is_empty()
                && overridden.iter().all(|(_, m)| {
                    m.return_type == removed.return_type && m.signature.is_empty() && !removed.is_more_accessible_than(m)
                });
            if !clearly_overridden {
                tracing::debug!(class = %id, method = %removed.name, "No identical overridden method, affecting method usages");
                affect_usages(ctx, id, &propagated, |owner| removed.create_usage(owner), None);
            }
        }

        for (sub, _) in future.get_overriding_methods(cls, removed) {
            ctx.affect_node(sub.id.clone());
        }

        if !removed.is_constructor() && !removed.is_abstract() && !removed.is_static() {
            for sub_id in &propagated {
                if let Some(sub) = future.get_nodes(sub_id).into_iter().next() {
                    let overridden: Vec<_> = future
                        .get_overridden_methods(sub, |m| m.is_same_by_java_rules(removed))
                        .into_iter()
                        .filter(|(_, m)| m.is_abstract() || removed.is_same(m))
                        .collect();
                    let all_abstract = !overridden.is_empty() && overridden.iter().all(|(_, m)| m.is_abstract());
                    if all_abstract || future.inherits_from_library_class(sub) {
                        tracing::debug!(class = %sub_id, method = %removed.name, "Inherited implementation became abstract");
                        ctx.affect_node(sub_id.clone());
                    }
                }
            }
        }
        true
    }

    fn process_changed_method<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        method: &MethodChange<'a>,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        let cls = change.past;
        let id = &cls.id;
        let past = method.past;
        let diff = &method.diff;

        if cls.is_interface() && diff.removed_flags().is_abstract() {
            affect_lambda_instantiations(ctx, present, id);
        }

        if cls.is_annotation() {
            if diff.value_removed() {
                let annotation = id.clone();
                let arg = past.name.clone();
                ctx.affect_usage_query("annotation default removed", move |_, usage| match usage {
                    Usage::Annotation { owner, used_arg_names, .. } => *owner == annotation && !used_arg_names.contains(&arg),
                    _ => false,
                });
            }
            return true;
        }

        let propagated = future.collect_subclasses_without_method(id, past);

        if diff.became_package_local() {
            let constraint = package_constraint(cls);
            affect_usages(ctx, id, &propagated, |owner| past.create_usage(owner), Some(&constraint));
        }

        if diff.signature_changed() || !diff.exceptions.unchanged() {
            tracing::debug!(class = %id, method = %past.name, "Throws list or signature changed");
            affect_method_usages(ctx, future, id, past);
            for (sub, _) in future.get_overriding_methods(cls, past) {
                ctx.affect_node(sub.id.clone());
            }
        } else if diff.flags_changed() {
            let added = diff.added_flags();
            let removed = diff.removed_flags();
            if added.intersects(JvmFlags::STATIC | JvmFlags::PRIVATE | JvmFlags::SYNTHETIC | JvmFlags::BRIDGE) || removed.is_static() {
                affect_method_usages(ctx, future, id, past);
                if added.is_static() {
                    affect_subclasses(ctx, future, id, false);
                    if !past.is_private() {
                        affect_static_on_demand_usages(ctx, id, &propagated);
                    }
                } else if removed.is_static() && !past.is_private() {
                    affect_static_import_usages(ctx, id, &past.name, &propagated);
                }
            } else {
                if added.intersects(JvmFlags::FINAL | JvmFlags::PUBLIC | JvmFlags::ABSTRACT) {
                    affect_subclasses(ctx, future, id, false);
                    if cls.is_interface() && added.is_abstract() {
                        affect_lambda_instantiations(ctx, present, id);
                    }
                }
                if added.is_protected() && !removed.is_private() {
                    let constraint = protected_constraint(cls);
                    affect_usages(ctx, id, &propagated, |owner| past.create_usage(owner), Some(&constraint));
                }
            }
        }

        let scope = self.annotations.method_annotations_changed(method.now, diff);
        if scope.usages {
            tracing::debug!(class = %id, method = %past.name, "Tracked annotation changed, affecting method usages");
            affect_method_usages(ctx, future, id, past);
        }
        if scope.subclasses {
            affect_subclasses(ctx, future, id, false);
        }

        if diff.access_expanded() {
            let now = method.now;
            let mut hierarchy = future.all_supertypes(id);
            hierarchy.extend(future.with_all_subclasses(id));
            for owner in hierarchy {
                for node in future.get_nodes(&owner) {
                    for overload in node.methods.iter().filter(|m| m.name == now.name && !m.is_same(now)) {
                        tracing::debug!(class = %owner, method = %overload.name, "Method became more accessible, affecting overloads");
                        affect_method_usages(ctx, future, &owner, overload);
                    }
                }
            }
        }
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
        let cls = change.past;
        let id = &cls.id;

        if cls.flags.is_enum() {
            ctx.affect_usage_with(Usage::class(id.clone()), UsageConstraint::SyntheticNodes);
        }

        let mut owners = future.collect_subclasses_without_field(id, &added.name);
        owners.insert(id.clone());

        for owner in &owners {
            if !added.is_private() {
                let shadows = future.get_nodes(owner).iter().any(|node| {
                    if node.is_local() {
                        return true;
                    }
                    if node.outer_fq_name.is_empty() {
                        return false;
                    }
                    let outer = future.get_nodes(&ReferenceId::new(node.outer_fq_name.clone()));
                    outer.is_empty() || outer.iter().any(|o| o.fields.iter().any(|f| f.name == added.name))
                });
                if shadows {
                    tracing::debug!(class = %owner, field = %added.name, "Added field may hide an enclosing name");
                    ctx.affect_node(owner.clone());
                }
                if added.is_static() {
                    ctx.affect_usage(Usage::ImportStaticOnDemand { owner: owner.clone() });
                }
            }
        }

        let name = added.name.clone();
        ctx.affect_usage_query("field name", move |_, usage| match usage {
            Usage::Field { owner, name: n, .. } => *n == name && owners.contains(owner),
            _ => false,
        });
        true
    }

    fn process_removed_field<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        removed: &'a JvmField,
        _future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        let cls = change.past;
        let id = &cls.id;

        if !ctx.params().process_constants_incrementally
            && !removed.is_private()
            && removed.is_inlinable()
            && removed.value.is_some()
        {
            affect_on_non_incremental_change(
                ctx,
                present,
                id,
                Exposure { public: removed.is_public(), protected: removed.is_protected(), field: Some(&removed.name) },
                format!("constant {id}.{} removed", removed.name),
            );
        }

        let propagated = affect_field_usages(ctx, present, id, removed);
        if !removed.is_private() && removed.is_static() {
            affect_static_import_usages(ctx, id, &removed.name, &propagated);
        }
        true
    }

    fn process_changed_field<'a>(
        &self,
        ctx: &mut DifferentiateContext<'a>,
        change: &ClassChange<'a>,
        field: &FieldChange<'a>,
        future: &Utils<'a>,
        present: &Utils<'a>,
    ) -> bool {
        let cls = change.past;
        let id = &cls.id;
        let past = field.past;
        let diff = &field.diff;
        let propagated = future.collect_subclasses_without_field(id, &past.name);
        let added = diff.added_flags();
        let removed = diff.removed_flags();

        if !past.is_private() && past.is_inlinable() && past.value.is_some() {
            let harmful = (added | removed).intersects(JvmFlags::STATIC | JvmFlags::FINAL);
            if harmful || diff.value_changed() || diff.access_restricted() {
                if ctx.params().process_constants_incrementally {
                    tracing::debug!(class = %id, field = %past.name, "Inlinable constant changed, affecting usages");
                    affect_field_usages(ctx, future, id, past);
                    affect_static_import_usages(ctx, id, &past.name, &propagated);
                } else {
                    affect_on_non_incremental_change(
                        ctx,
                        present,
                        id,
                        Exposure { public: past.is_public(), protected: past.is_protected(), field: Some(&past.name) },
                        format!("constant {id}.{} changed", past.name),
                    );
                }
            }
        }

        if diff.type_changed() || diff.signature_changed() {
            affect_field_usages(ctx, future, id, past);
        } else if diff.flags_changed() {
            if added.intersects(JvmFlags::STATIC | JvmFlags::PRIVATE | JvmFlags::VOLATILE) || removed.is_static() {
                affect_field_usages(ctx, future, id, past);
                if !past.is_private() {
                    if added.is_static() {
                        affect_static_on_demand_usages(ctx, id, &propagated);
                    } else if removed.is_static() {
                        affect_static_import_usages(ctx, id, &past.name, &propagated);
                    }
                }
            } else {
                let mut constraint = None;
                if removed.is_public() {
                    constraint = Some(if added.is_protected() { protected_constraint(cls) } else { package_constraint(cls) });
                } else if removed.is_protected() && diff.access_restricted() {
                    constraint = Some(package_constraint(cls));
                }
                if let Some(c) = &constraint {
                    affect_usages(ctx, id, &propagated, |owner| past.create_usage(owner), Some(c));
                }
                if added.is_final() {
                    tracing::debug!(class = %id, field = %past.name, "Field became final, affecting assignments");
                    affect_usages(ctx, id, &propagated, |owner| past.create_assign_usage(owner), constraint.as_ref());
                }
            }
        }

        if self.annotations.field_annotations_changed(field.now, diff).usages {
            tracing::debug!(class = %id, field = %past.name, "Tracked annotation changed, affecting field usages");
            affect_field_usages(ctx, future, id, past);
        }
        true
    }
}
