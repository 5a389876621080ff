//! Kotlin-on-JVM helpers.
//!
//! Kotlin declarations compile to JVM members whose names do not always match
//! the source: properties become `getX`/`setX` accessors, top-level
//! declarations land in a file facade class. These helpers map between the
//! JVM node model and the parsed [`KotlinMeta`] attached to a node.

use crate::types::{
    JvmClass, JvmMethod, KmFunction, KmProperty, KmTypeAlias, KotlinMeta, Modality, ReferenceId, Usage,
};

/// Node compiled from Kotlin.
pub fn is_kotlin_node(cls: &JvmClass) -> bool {
    cls.kotlin_meta().is_some()
}

/// Sealed class: Kotlin `sealed` modality or a Java `permits` list.
pub fn is_sealed(cls: &JvmClass) -> bool {
    let kotlin_sealed = cls
        .kotlin_meta()
        .and_then(KotlinMeta::as_class)
        .map_or(false, |c| c.modality == Modality::Sealed);
    kotlin_sealed || !cls.permitted_subclasses.is_empty()
}

/// Kotlin function implemented by the JVM method.
pub fn km_function<'c>(cls: &'c JvmClass, method: &JvmMethod) -> Option<&'c KmFunction> {
    let descriptor = method.descriptor();
    cls.kotlin_meta()?.functions().iter().find(|f| {
        f.jvm_signature
            .as_ref()
            .map_or(false, |s| s.matches(&method.name, &descriptor))
    })
}

/// Kotlin property the JVM method is a getter or setter of.
pub fn km_property<'c>(cls: &'c JvmClass, method: &JvmMethod) -> Option<&'c KmProperty> {
    let descriptor = method.descriptor();
    let is_accessor = |sig: &Option<crate::types::JvmMemberSignature>| {
        sig.as_ref().map_or(false, |s| s.matches(&method.name, &descriptor))
    };
    cls.kotlin_meta()?
        .properties()
        .iter()
        .find(|p| is_accessor(&p.getter) || is_accessor(&p.setter))
}

/// JVM private, or private in Kotlin.
pub fn is_declared_private(cls: &JvmClass, method: &JvmMethod) -> bool {
    if method.is_private() {
        return true;
    }
    if let Some(f) = km_function(cls, method) {
        return f.visibility.is_private();
    }
    km_property(cls, method).map_or(false, |p| p.visibility.is_private())
}

/// Kotlin-visible name of a JVM method: the function or property name.
pub fn kotlin_name<'c>(cls: &'c JvmClass, method: &JvmMethod) -> Option<&'c str> {
    km_function(cls, method)
        .map(|f| f.name.as_str())
        .or_else(|| km_property(cls, method).map(|p| p.name.as_str()))
}

/// Method implements an `inline` function.
pub fn is_inline(cls: &JvmClass, method: &JvmMethod) -> bool {
    km_function(cls, method).map_or(false, |f| f.is_inline)
}

/// Method body is copied into Kotlin call sites: an `inline` function or the
/// getter of a `const val`.
pub fn is_inlined_at_call_sites(cls: &JvmClass, method: &JvmMethod) -> bool {
    is_inline(cls, method) || km_property(cls, method).map_or(false, |p| p.is_const)
}

/// Method implements an `operator` function.
pub fn is_operator(cls: &JvmClass, method: &JvmMethod) -> bool {
    km_function(cls, method).map_or(false, |f| f.is_operator)
}

/// Scope Kotlin name lookups are recorded against: the package for file
/// facades, the Kotlin class name for classes.
pub fn lookup_scope(cls: &JvmClass) -> ReferenceId {
    match cls.kotlin_meta() {
        Some(KotlinMeta::Package(_)) => ReferenceId::new(cls.package_name()),
        Some(KotlinMeta::Class(c)) => ReferenceId::new(c.name.clone()),
        _ => cls.id.clone(),
    }
}

/// Name lookup usage matching calls to the method from Kotlin.
pub fn lookup_usage(cls: &JvmClass, method: &JvmMethod) -> Usage {
    let name = kotlin_name(cls, method).unwrap_or(&method.name);
    Usage::lookup(lookup_scope(cls), name)
}

/// Type aliases declared by the node.
pub fn type_aliases(cls: &JvmClass) -> &[KmTypeAlias] {
    cls.kotlin_meta().map(KotlinMeta::type_aliases).unwrap_or(&[])
}

/// A Java bean property as Kotlin's synthetic property access sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor<'c> {
    /// Synthetic property name (`bar` for `getBar`, `isDone` for `isDone`).
    pub name: String,
    /// Getter.
    pub getter: &'c JvmMethod,
    /// Setter taking one argument of the getter's type, if declared.
    pub setter: Option<&'c JvmMethod>,
}

fn decapitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Accessor suffix after `prefix` if it starts a capitalized name.
fn accessor_suffix<'s>(name: &'s str, prefix: &str) -> Option<&'s str> {
    name.strip_prefix(prefix)
        .filter(|rest| rest.chars().next().map_or(false, char::is_uppercase))
}

/// Pair getters with setters by stripped property name.
///
/// `getX` (any non-void return) and `isX` (boolean return) taking no
/// arguments are getters; `setX` taking one argument of the getter's return
/// type is the matching setter.
pub fn find_properties(cls: &JvmClass) -> Vec<PropertyDescriptor<'_>> {
    let mut found = Vec::new();
    for getter in cls.methods.iter().filter(|m| m.arg_types.is_empty() && !m.is_static()) {
        let (name, suffix) = if let Some(rest) = accessor_suffix(&getter.name, "get") {
            if getter.return_type.descriptor() == "V" {
                continue;
            }
            (decapitalize(rest), rest)
        } else if let Some(rest) = accessor_suffix(&getter.name, "is") {
            if !getter.return_type.is_boolean() {
                continue;
            }
            (getter.name.clone(), rest)
        } else {
            continue;
        };
        let setter_name = format!("set{suffix}");
        let setter = cls.methods.iter().find(|m| {
            m.name == setter_name && !m.is_static() && m.arg_types.len() == 1 && m.arg_types[0] == getter.return_type
        });
        found.push(PropertyDescriptor { name, getter, setter });
    }
    found
}

/// Whether a field name denotes the same synthetic property.
///
/// Matches ignoring case, and with an `is` prefix of the property stripped.
pub fn property_matches_field(property: &str, field: &str) -> bool {
    property.eq_ignore_ascii_case(field)
        || accessor_suffix(property, "is").map_or(false, |rest| rest.eq_ignore_ascii_case(field))
}

/// Whether a class named `short_name` added to `package` can clash with a
/// name the node already resolves.
///
/// The node star-imports `package` and either references a class with the
/// same short name from another package or calls a method named like the
/// class.
pub fn has_on_demand_import_conflict(node: &JvmClass, short_name: &str, package: &str) -> bool {
    if !node.usages.contains(&Usage::import_package_on_demand(package)) {
        return false;
    }
    node.usages.iter().any(|u| match u {
        Usage::Class { owner } => {
            owner.package_name() != package && owner.name().rsplit('/').next() == Some(short_name)
        }
        Usage::Method { name, .. } => name == short_name,
        _ => false,
    })
}
