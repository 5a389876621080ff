//! Structured differences between past and present node snapshots.
//!
//! [`deep_diff`] partitions two member lists into added, removed and changed
//! entries. Members are paired by [`DiffCapable::is_same`]; a pair whose
//! [`Difference`] reports no change is dropped, so every member lands in at
//! most one of the three collections.

use crate::types::{
    ElemType, JvmClass, JvmField, JvmFlags, JvmMethod, KmFunction, KmProperty, KotlinMeta,
};

/// A difference that can tell whether anything changed.
pub trait Difference {
    /// No observable change.
    fn unchanged(&self) -> bool;
}

impl Difference for () {
    fn unchanged(&self) -> bool {
        true
    }
}

/// An element that can be paired with its counterpart and diffed.
pub trait DiffCapable {
    /// Structured difference type.
    type Diff<'a>: Difference
    where
        Self: 'a;

    /// Whether `other` is the same element (identity, not equality).
    fn is_same(&self, other: &Self) -> bool;

    /// Difference from `self` (past) to `now`.
    fn difference<'a>(&'a self, now: &'a Self) -> Self::Diff<'a>;
}

/// A changed element: past and present snapshot plus their difference.
#[derive(Debug)]
pub struct Change<'a, T, D> {
    /// Past snapshot.
    pub past: &'a T,
    /// Present snapshot.
    pub now: &'a T,
    /// Difference.
    pub diff: D,
}

/// Added, removed and changed elements of a collection.
#[derive(Debug)]
pub struct Specifier<'a, T, D> {
    added: Vec<&'a T>,
    removed: Vec<&'a T>,
    changed: Vec<Change<'a, T, D>>,
}

impl<'a, T, D> Specifier<'a, T, D> {
    /// Elements present only now.
    pub fn added(&self) -> &[&'a T] {
        &self.added
    }

    /// Elements present only in the past.
    pub fn removed(&self) -> &[&'a T] {
        &self.removed
    }

    /// Elements present on both sides that differ.
    pub fn changed(&self) -> &[Change<'a, T, D>] {
        &self.changed
    }

    /// Nothing added, removed or changed.
    pub fn unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Diff two collections compared by equality (no nested differences).
pub fn diff<'a, T: PartialEq>(past: &'a [T], now: &'a [T]) -> Specifier<'a, T, ()> {
    Specifier {
        added: now.iter().filter(|n| !past.contains(n)).collect(),
        removed: past.iter().filter(|p| !now.contains(p)).collect(),
        changed: Vec::new(),
    }
}

/// Diff two collections of diff-capable elements.
pub fn deep_diff<'a, T: DiffCapable + 'a>(
    past: impl IntoIterator<Item = &'a T>,
    now: impl IntoIterator<Item = &'a T>,
) -> Specifier<'a, T, T::Diff<'a>> {
    let past: Vec<&'a T> = past.into_iter().collect();
    let mut matched = vec![false; past.len()];
    let mut added = Vec::new();
    let mut changed = Vec::new();

    for n in now {
        let pair = past
            .iter()
            .enumerate()
            .find(|(i, p)| !matched[*i] && p.is_same(n))
            .map(|(i, p)| (i, *p));
        match pair {
            Some((i, p)) => {
                matched[i] = true;
                let d = p.difference(n);
                if !d.unchanged() {
                    changed.push(Change { past: p, now: n, diff: d });
                }
            }
            None => added.push(n),
        }
    }

    let removed = past
        .into_iter()
        .zip(matched)
        .filter(|(_, m)| !m)
        .map(|(p, _)| p)
        .collect();

    Specifier { added, removed, changed }
}

/// Difference between two snapshots of a method.
#[derive(Debug)]
pub struct MethodDiff<'a> {
    past: &'a JvmMethod,
    now: &'a JvmMethod,
    /// Declared exceptions.
    pub exceptions: Specifier<'a, String, ()>,
    /// Applied annotations.
    pub annotations: Specifier<'a, String, ()>,
}

impl<'a> MethodDiff<'a> {
    /// Flags set now but not before.
    pub fn added_flags(&self) -> JvmFlags {
        self.past.flags.added_in(self.now.flags)
    }

    /// Flags set before but not now.
    pub fn removed_flags(&self) -> JvmFlags {
        self.past.flags.removed_in(self.now.flags)
    }

    /// Any flag changed.
    pub fn flags_changed(&self) -> bool {
        self.past.flags != self.now.flags
    }

    /// Generic signature changed.
    pub fn signature_changed(&self) -> bool {
        self.past.signature != self.now.signature
    }

    /// Default value or inline body hash changed.
    pub fn value_changed(&self) -> bool {
        self.past.value != self.now.value
    }

    /// Default value removed.
    pub fn value_removed(&self) -> bool {
        self.past.value.is_some() && self.now.value.is_none()
    }

    /// Method became accessible from more places.
    pub fn access_expanded(&self) -> bool {
        self.past.flags.is_weaker_access(self.now.flags)
    }

    /// Method became package-private.
    pub fn became_package_local(&self) -> bool {
        !self.past.is_package_local() && self.now.is_package_local()
    }
}

impl Difference for MethodDiff<'_> {
    fn unchanged(&self) -> bool {
        !self.flags_changed()
            && !self.signature_changed()
            && !self.value_changed()
            && self.exceptions.unchanged()
            && self.annotations.unchanged()
    }
}

impl DiffCapable for JvmMethod {
    type Diff<'a> = MethodDiff<'a>;

    fn is_same(&self, other: &Self) -> bool {
        JvmMethod::is_same(self, other)
    }

    fn difference<'a>(&'a self, now: &'a Self) -> MethodDiff<'a> {
        MethodDiff {
            past: self,
            now,
            exceptions: diff(&self.exceptions, &now.exceptions),
            annotations: diff(&self.annotations, &now.annotations),
        }
    }
}

/// Difference between two snapshots of a field.
#[derive(Debug)]
pub struct FieldDiff<'a> {
    past: &'a JvmField,
    now: &'a JvmField,
    /// Applied annotations.
    pub annotations: Specifier<'a, String, ()>,
}

impl<'a> FieldDiff<'a> {
    /// Flags set now but not before.
    pub fn added_flags(&self) -> JvmFlags {
        self.past.flags.added_in(self.now.flags)
    }

    /// Flags set before but not now.
    pub fn removed_flags(&self) -> JvmFlags {
        self.past.flags.removed_in(self.now.flags)
    }

    /// Any flag changed.
    pub fn flags_changed(&self) -> bool {
        self.past.flags != self.now.flags
    }

    /// Field type changed.
    pub fn type_changed(&self) -> bool {
        self.past.ty != self.now.ty
    }

    /// Generic signature changed.
    pub fn signature_changed(&self) -> bool {
        self.past.signature != self.now.signature
    }

    /// Constant value changed.
    pub fn value_changed(&self) -> bool {
        self.past.value != self.now.value
    }

    /// Field became accessible from fewer places.
    pub fn access_restricted(&self) -> bool {
        self.now.flags.is_weaker_access(self.past.flags)
    }

    /// Field became accessible from more places.
    pub fn access_expanded(&self) -> bool {
        self.past.flags.is_weaker_access(self.now.flags)
    }
}

impl Difference for FieldDiff<'_> {
    fn unchanged(&self) -> bool {
        !self.flags_changed()
            && !self.type_changed()
            && !self.signature_changed()
            && !self.value_changed()
            && self.annotations.unchanged()
    }
}

impl DiffCapable for JvmField {
    type Diff<'a> = FieldDiff<'a>;

    fn is_same(&self, other: &Self) -> bool {
        self.name == other.name
    }

    fn difference<'a>(&'a self, now: &'a Self) -> FieldDiff<'a> {
        FieldDiff {
            past: self,
            now,
            annotations: diff(&self.annotations, &now.annotations),
        }
    }
}

/// Difference between two snapshots of a Kotlin function.
#[derive(Debug)]
pub struct KmFunctionDiff<'a> {
    past: &'a KmFunction,
    now: &'a KmFunction,
}

impl KmFunctionDiff<'_> {
    /// Some parameter went from `T?` to `T`.
    pub fn args_became_not_null(&self) -> bool {
        self.past
            .value_parameters
            .iter()
            .zip(&self.now.value_parameters)
            .any(|(p, n)| p.ty.nullable && !n.ty.nullable)
    }

    /// Return type went from `T?` to `T`.
    pub fn return_became_not_null(&self) -> bool {
        self.past.return_type.nullable && !self.now.return_type.nullable
    }

    /// Return type went from `T` to `T?`.
    pub fn return_became_nullable(&self) -> bool {
        !self.past.return_type.nullable && self.now.return_type.nullable
    }

    /// Any nullability change of the parameters or the return type.
    pub fn nullability_changed(&self) -> bool {
        self.past.return_type.nullable != self.now.return_type.nullable
            || self
                .past
                .value_parameters
                .iter()
                .zip(&self.now.value_parameters)
                .any(|(p, n)| p.ty.nullable != n.ty.nullable)
    }
}

impl Difference for KmFunctionDiff<'_> {
    fn unchanged(&self) -> bool {
        self.past == self.now
    }
}

impl DiffCapable for KmFunction {
    type Diff<'a> = KmFunctionDiff<'a>;

    fn is_same(&self, other: &Self) -> bool {
        match (&self.jvm_signature, &other.jvm_signature) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name && self.value_parameters.len() == other.value_parameters.len(),
        }
    }

    fn difference<'a>(&'a self, now: &'a Self) -> KmFunctionDiff<'a> {
        KmFunctionDiff { past: self, now }
    }
}

/// Difference between two snapshots of a Kotlin property.
#[derive(Debug)]
pub struct KmPropertyDiff<'a> {
    past: &'a KmProperty,
    now: &'a KmProperty,
}

impl KmPropertyDiff<'_> {
    /// Type went from `T?` to `T`.
    pub fn became_not_null(&self) -> bool {
        self.past.return_type.nullable && !self.now.return_type.nullable
    }

    /// Type went from `T` to `T?`.
    pub fn became_nullable(&self) -> bool {
        !self.past.return_type.nullable && self.now.return_type.nullable
    }
}

impl Difference for KmPropertyDiff<'_> {
    fn unchanged(&self) -> bool {
        self.past == self.now
    }
}

impl DiffCapable for KmProperty {
    type Diff<'a> = KmPropertyDiff<'a>;

    fn is_same(&self, other: &Self) -> bool {
        self.name == other.name
    }

    fn difference<'a>(&'a self, now: &'a Self) -> KmPropertyDiff<'a> {
        KmPropertyDiff { past: self, now }
    }
}

/// Difference between the Kotlin metadata of two class snapshots.
#[derive(Debug)]
pub struct KotlinMetaDiff<'a> {
    /// Declared functions.
    pub functions: Specifier<'a, KmFunction, KmFunctionDiff<'a>>,
    /// Declared properties.
    pub properties: Specifier<'a, KmProperty, KmPropertyDiff<'a>>,
}

impl<'a> KotlinMetaDiff<'a> {
    fn between(past: Option<&'a KotlinMeta>, now: Option<&'a KotlinMeta>) -> Self {
        let empty_fns: &'a [KmFunction] = &[];
        let empty_props: &'a [KmProperty] = &[];
        Self {
            functions: deep_diff(
                past.map_or(empty_fns, KotlinMeta::functions),
                now.map_or(empty_fns, KotlinMeta::functions),
            ),
            properties: deep_diff(
                past.map_or(empty_props, KotlinMeta::properties),
                now.map_or(empty_props, KotlinMeta::properties),
            ),
        }
    }
}

impl Difference for KotlinMetaDiff<'_> {
    fn unchanged(&self) -> bool {
        self.functions.unchanged() && self.properties.unchanged()
    }
}

/// Difference between two snapshots of a class.
#[derive(Debug)]
pub struct ClassDiff<'a> {
    past: &'a JvmClass,
    now: &'a JvmClass,
    /// Implemented interfaces.
    pub interfaces: Specifier<'a, String, ()>,
    /// Declared methods.
    pub methods: Specifier<'a, JvmMethod, MethodDiff<'a>>,
    /// Declared fields.
    pub fields: Specifier<'a, JvmField, FieldDiff<'a>>,
    /// Class annotations.
    pub annotations: Specifier<'a, String, ()>,
    /// `@Target` elements of an annotation type.
    pub annotation_targets: Specifier<'a, ElemType, ()>,
    /// Kotlin metadata.
    pub kotlin: KotlinMetaDiff<'a>,
}

impl<'a> ClassDiff<'a> {
    /// Flags set now but not before.
    pub fn added_flags(&self) -> JvmFlags {
        self.past.flags.added_in(self.now.flags)
    }

    /// Flags set before but not now.
    pub fn removed_flags(&self) -> JvmFlags {
        self.past.flags.removed_in(self.now.flags)
    }

    /// Any flag changed.
    pub fn flags_changed(&self) -> bool {
        self.past.flags != self.now.flags
    }

    /// Super class changed.
    pub fn super_class_changed(&self) -> bool {
        self.past.super_class != self.now.super_class
    }

    /// The class used to extend `Object` and now extends something else.
    pub fn extends_added(&self) -> bool {
        self.past.super_class == crate::types::OBJECT_CLASS_NAME && self.super_class_changed()
    }

    /// Generic signature changed.
    pub fn signature_changed(&self) -> bool {
        self.past.signature != self.now.signature
    }

    /// Retention policy of an annotation type changed.
    pub fn retention_policy_changed(&self) -> bool {
        self.past.retention_policy != self.now.retention_policy
    }

    /// Java sealed `permits` list changed.
    pub fn permitted_subclasses_changed(&self) -> bool {
        self.past.permitted_subclasses != self.now.permitted_subclasses
    }

    /// Supertype set changed (super class or interfaces).
    pub fn supertypes_changed(&self) -> bool {
        self.super_class_changed() || !self.interfaces.unchanged()
    }
}

impl Difference for ClassDiff<'_> {
    fn unchanged(&self) -> bool {
        !self.flags_changed()
            && !self.super_class_changed()
            && !self.signature_changed()
            && !self.retention_policy_changed()
            && !self.permitted_subclasses_changed()
            && self.past.outer_fq_name == self.now.outer_fq_name
            && self.interfaces.unchanged()
            && self.methods.unchanged()
            && self.fields.unchanged()
            && self.annotations.unchanged()
            && self.annotation_targets.unchanged()
            && self.kotlin.unchanged()
            && self.past.metadata == self.now.metadata
    }
}

impl DiffCapable for JvmClass {
    type Diff<'a> = ClassDiff<'a>;

    fn is_same(&self, other: &Self) -> bool {
        self.id == other.id
    }

    fn difference<'a>(&'a self, now: &'a Self) -> ClassDiff<'a> {
        ClassDiff {
            past: self,
            now,
            interfaces: diff(&self.interfaces, &now.interfaces),
            methods: deep_diff(&self.methods, &now.methods),
            fields: deep_diff(&self.fields, &now.fields),
            annotations: diff(&self.annotations, &now.annotations),
            annotation_targets: diff(&self.annotation_targets, &now.annotation_targets),
            kotlin: KotlinMetaDiff::between(self.kotlin_meta(), now.kotlin_meta()),
        }
    }
}
