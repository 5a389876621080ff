//! JVM class nodes and their members.
//!
//! A [`JvmClass`] is the per-class fact record the front end produces for
//! every compiled class: hierarchy, members, usages and metadata. Nodes are
//! immutable snapshots; identity across rounds is by [`ReferenceId`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::flags::JvmFlags;
use super::id::{package_of, ReferenceId};
use super::kotlin::KotlinMeta;
use super::usage::{ElemType, Usage};

/// Internal name of `java.lang.Object`.
pub const OBJECT_CLASS_NAME: &str = "java/lang/Object";

/// A JVM type in descriptor form (`I`, `Z`, `Ljava/lang/String;`, `[J`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeRepr(String);

impl TypeRepr {
    /// Type from a descriptor.
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    /// Class type from an internal name.
    pub fn class(internal_name: &str) -> Self {
        Self(format!("L{internal_name};"))
    }

    /// `void`.
    pub fn void() -> Self {
        Self("V".to_string())
    }

    /// Descriptor text.
    pub fn descriptor(&self) -> &str {
        &self.0
    }

    /// Internal class name for object types.
    pub fn class_name(&self) -> Option<&str> {
        self.0.strip_prefix('L').and_then(|s| s.strip_suffix(';'))
    }

    /// Primitive or `java.lang.String`: the types a compile-time constant can have.
    pub fn is_constant_type(&self) -> bool {
        (self.0.len() == 1 && self.0 != "V") || self.class_name() == Some("java/lang/String")
    }

    /// `boolean`.
    pub fn is_boolean(&self) -> bool {
        self.0 == "Z"
    }
}

/// Retention policy of an annotation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetentionPolicy {
    /// Discarded by the compiler.
    Source,
    /// Recorded in the class file, not visible at runtime.
    Class,
    /// Visible at runtime.
    Runtime,
}

/// A method of a JVM class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JvmMethod {
    /// Method name (`<init>` for constructors).
    pub name: String,
    /// Access flags.
    pub flags: JvmFlags,
    /// Argument types.
    pub arg_types: Vec<TypeRepr>,
    /// Return type.
    pub return_type: TypeRepr,
    /// Generic signature, empty when not generic.
    pub signature: String,
    /// Declared exceptions (internal names).
    pub exceptions: Vec<String>,
    /// Annotation types applied to the method (internal names).
    pub annotations: Vec<String>,
    /// Annotation attribute default value, or the body hash of an inline function.
    pub value: Option<String>,
}

impl JvmMethod {
    /// Create a method.
    pub fn new(name: impl Into<String>, flags: JvmFlags, arg_types: Vec<TypeRepr>, return_type: TypeRepr) -> Self {
        Self {
            name: name.into(),
            flags,
            arg_types,
            return_type,
            signature: String::new(),
            exceptions: Vec::new(),
            annotations: Vec::new(),
            value: None,
        }
    }

    /// Add a declared exception.
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exceptions.push(exception.into());
        self
    }

    /// Add an annotation.
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    /// Set the value (default or inline body hash).
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set the generic signature.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// JVM descriptor: `(args)ret`.
    pub fn descriptor(&self) -> String {
        let mut d = String::from("(");
        for arg in &self.arg_types {
            d.push_str(arg.descriptor());
        }
        d.push(')');
        d.push_str(self.return_type.descriptor());
        d
    }

    /// Constructor.
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// `private`.
    pub fn is_private(&self) -> bool {
        self.flags.is_private()
    }

    /// `static`.
    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    /// `abstract`.
    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract()
    }

    /// `final`.
    pub fn is_final(&self) -> bool {
        self.flags.is_final()
    }

    /// Package-private.
    pub fn is_package_local(&self) -> bool {
        self.flags.is_package_local()
    }

    /// Same name and descriptor.
    pub fn is_same(&self, other: &JvmMethod) -> bool {
        self.name == other.name && self.arg_types == other.arg_types && self.return_type == other.return_type
    }

    /// Same name and argument types (overriding ignores the return type).
    pub fn is_same_by_java_rules(&self, other: &JvmMethod) -> bool {
        self.name == other.name && self.arg_types == other.arg_types
    }

    /// Whether `self` is accessible from more places than `other`.
    pub fn is_more_accessible_than(&self, other: &JvmMethod) -> bool {
        other.flags.is_weaker_access(self.flags)
    }

    /// Usage of this method resolved against `owner`.
    pub fn create_usage(&self, owner: &ReferenceId) -> Usage {
        Usage::method(owner.clone(), self.name.clone(), self.descriptor())
    }
}

/// A field of a JVM class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JvmField {
    /// Field name.
    pub name: String,
    /// Access flags.
    pub flags: JvmFlags,
    /// Field type.
    pub ty: TypeRepr,
    /// Generic signature, empty when not generic.
    pub signature: String,
    /// Constant value, if the field has a `ConstantValue` attribute.
    pub value: Option<String>,
    /// Annotation types applied to the field (internal names).
    pub annotations: Vec<String>,
}

impl JvmField {
    /// Create a field.
    pub fn new(name: impl Into<String>, flags: JvmFlags, ty: TypeRepr) -> Self {
        Self {
            name: name.into(),
            flags,
            ty,
            signature: String::new(),
            value: None,
            annotations: Vec::new(),
        }
    }

    /// Set the constant value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Add an annotation.
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    /// `private`.
    pub fn is_private(&self) -> bool {
        self.flags.is_private()
    }

    /// `static`.
    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    /// `public`.
    pub fn is_public(&self) -> bool {
        self.flags.is_public()
    }

    /// `protected`.
    pub fn is_protected(&self) -> bool {
        self.flags.is_protected()
    }

    /// Final field of a constant type: its value may be copied into call sites.
    pub fn is_inlinable(&self) -> bool {
        self.flags.is_final() && self.ty.is_constant_type()
    }

    /// Read usage of this field resolved against `owner`.
    pub fn create_usage(&self, owner: &ReferenceId) -> Usage {
        Usage::field(owner.clone(), self.name.clone(), self.ty.descriptor())
    }

    /// Write usage of this field resolved against `owner`.
    pub fn create_assign_usage(&self, owner: &ReferenceId) -> Usage {
        Usage::FieldAssign {
            owner: owner.clone(),
            name: self.name.clone(),
            descriptor: self.ty.descriptor().to_string(),
        }
    }
}

/// Typed metadata attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeMetadata {
    /// Parsed `kotlin.Metadata`.
    Kotlin(KotlinMeta),
}

/// A compiled JVM class: the node type of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JvmClass {
    /// Internal class name.
    pub id: ReferenceId,
    /// Access flags.
    pub flags: JvmFlags,
    /// Generic signature, empty when not generic.
    pub signature: String,
    /// Super class internal name, empty for `java/lang/Object` itself.
    pub super_class: String,
    /// Implemented interfaces.
    pub interfaces: Vec<String>,
    /// Enclosing class internal name, empty for top-level classes.
    pub outer_fq_name: String,
    /// Declared fields.
    pub fields: Vec<JvmField>,
    /// Declared methods.
    pub methods: Vec<JvmMethod>,
    /// Annotation types applied to the class.
    pub annotations: Vec<String>,
    /// Retention of an annotation type.
    pub retention_policy: Option<RetentionPolicy>,
    /// `@Target` of an annotation type.
    pub annotation_targets: Vec<ElemType>,
    /// `PermittedSubclasses` of a Java sealed class.
    pub permitted_subclasses: Vec<String>,
    /// Usages recorded in the class body.
    pub usages: BTreeSet<Usage>,
    /// Typed metadata entries.
    pub metadata: Vec<NodeMetadata>,
}

impl JvmClass {
    /// Create a class extending `java/lang/Object`.
    pub fn new(id: impl Into<ReferenceId>, flags: JvmFlags) -> Self {
        Self {
            id: id.into(),
            flags,
            signature: String::new(),
            super_class: OBJECT_CLASS_NAME.to_string(),
            interfaces: Vec::new(),
            outer_fq_name: String::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            retention_policy: None,
            annotation_targets: Vec::new(),
            permitted_subclasses: Vec::new(),
            usages: BTreeSet::new(),
            metadata: Vec::new(),
        }
    }

    /// Set the super class.
    pub fn with_super(mut self, super_class: impl Into<String>) -> Self {
        self.super_class = super_class.into();
        self
    }

    /// Add an implemented interface.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Set the enclosing class.
    pub fn with_outer(mut self, outer: impl Into<String>) -> Self {
        self.outer_fq_name = outer.into();
        self
    }

    /// Add a method.
    pub fn with_method(mut self, method: JvmMethod) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a field.
    pub fn with_field(mut self, field: JvmField) -> Self {
        self.fields.push(field);
        self
    }

    /// Record a usage.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usages.insert(usage);
        self
    }

    /// Attach Kotlin metadata.
    pub fn with_kotlin(mut self, meta: KotlinMeta) -> Self {
        self.metadata.push(NodeMetadata::Kotlin(meta));
        self
    }

    /// Set the generic signature.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Internal name.
    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// Package in internal form.
    pub fn package_name(&self) -> &str {
        package_of(self.id.name())
    }

    /// Simple name without package or enclosing class.
    pub fn short_name(&self) -> &str {
        let name = self.id.name();
        if !self.outer_fq_name.is_empty() {
            if let Some(rest) = name.strip_prefix(self.outer_fq_name.as_str()).and_then(|r| r.strip_prefix('$')) {
                return rest;
            }
        }
        match name.rfind('/') {
            Some(idx) => &name[idx + 1..],
            None => name,
        }
    }

    /// Direct supertype names: super class then interfaces.
    pub fn super_types(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.super_class.as_str())
            .filter(|s| !s.is_empty())
            .chain(self.interfaces.iter().map(String::as_str))
    }

    /// Kotlin metadata, if present.
    pub fn kotlin_meta(&self) -> Option<&KotlinMeta> {
        self.metadata.iter().find_map(|m| match m {
            NodeMetadata::Kotlin(k) => Some(k),
        })
    }

    /// Find a method with the same name and descriptor.
    pub fn find_method(&self, method: &JvmMethod) -> Option<&JvmMethod> {
        self.methods.iter().find(|m| m.is_same(method))
    }

    /// `private`.
    pub fn is_private(&self) -> bool {
        self.flags.is_private()
    }

    /// Interface (including annotation types).
    pub fn is_interface(&self) -> bool {
        self.flags.is_interface()
    }

    /// `abstract`.
    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract()
    }

    /// Annotation type.
    pub fn is_annotation(&self) -> bool {
        self.flags.is_annotation()
    }

    /// Anonymous class.
    pub fn is_anonymous(&self) -> bool {
        self.flags.contains(JvmFlags::ANONYMOUS)
    }

    /// Local class.
    pub fn is_local(&self) -> bool {
        self.flags.contains(JvmFlags::LOCAL)
    }

    /// Non-static nested class.
    pub fn is_inner_class(&self) -> bool {
        !self.outer_fq_name.is_empty() && !self.flags.is_static()
    }

    /// Neither nested, local nor anonymous.
    pub fn is_top_level(&self) -> bool {
        self.outer_fq_name.is_empty() && !self.is_local() && !self.is_anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_descriptor() {
        let m = JvmMethod::new(
            "foo",
            JvmFlags::PUBLIC,
            vec![TypeRepr::new("I"), TypeRepr::class("java/lang/String")],
            TypeRepr::void(),
        );
        assert_eq!(m.descriptor(), "(ILjava/lang/String;)V");
    }

    #[test]
    fn test_method_identity() {
        let a = JvmMethod::new("foo", JvmFlags::PUBLIC, vec![TypeRepr::new("I")], TypeRepr::void());
        let b = JvmMethod::new("foo", JvmFlags::PRIVATE, vec![TypeRepr::new("I")], TypeRepr::new("I"));
        assert!(!a.is_same(&b));
        assert!(a.is_same_by_java_rules(&b));
        assert!(a.is_more_accessible_than(&b));
    }

    #[test]
    fn test_short_name() {
        let top = JvmClass::new("a/b/Foo", JvmFlags::PUBLIC);
        assert_eq!(top.short_name(), "Foo");
        assert_eq!(top.package_name(), "a/b");

        let inner = JvmClass::new("a/b/Foo$Bar", JvmFlags::PUBLIC).with_outer("a/b/Foo");
        assert_eq!(inner.short_name(), "Bar");
        assert!(inner.is_inner_class());
        assert!(!inner.is_top_level());
    }

    #[test]
    fn test_inlinable_field() {
        let constant = JvmField::new("X", JvmFlags::PUBLIC | JvmFlags::STATIC | JvmFlags::FINAL, TypeRepr::new("I"));
        let object = JvmField::new("Y", JvmFlags::PUBLIC | JvmFlags::FINAL, TypeRepr::class("java/util/List"));
        assert!(constant.is_inlinable());
        assert!(!object.is_inlinable());
    }

    #[test]
    fn test_super_types_skip_empty() {
        let object = JvmClass::new("java/lang/Object", JvmFlags::PUBLIC).with_super("");
        assert_eq!(object.super_types().count(), 0);
        let cls = JvmClass::new("a/Foo", JvmFlags::PUBLIC).with_interface("a/Bar");
        assert_eq!(cls.super_types().collect::<Vec<_>>(), vec![OBJECT_CLASS_NAME, "a/Bar"]);
    }
}
