//! Annotation change tracking.
//!
//! Most annotations do not affect how dependent code compiles. Nullability
//! annotations do: Kotlin reads them as part of a member's type. The tracker
//! holds an allow-list of such annotation types and maps annotation changes on
//! a member to the recompilation scope they require.

use std::collections::BTreeSet;

use crate::diff::{FieldDiff, MethodDiff};
use crate::types::{JvmField, JvmMethod};

/// Nullability annotations from the common ecosystems, in internal form.
pub const NULLABILITY_ANNOTATIONS: &[&str] = &[
    "org/jetbrains/annotations/NotNull",
    "org/jetbrains/annotations/Nullable",
    "javax/annotation/Nonnull",
    "javax/annotation/Nullable",
    "javax/annotation/CheckForNull",
    "androidx/annotation/NonNull",
    "androidx/annotation/Nullable",
    "androidx/annotation/RecentlyNonNull",
    "androidx/annotation/RecentlyNullable",
    "android/support/annotation/NonNull",
    "android/support/annotation/Nullable",
    "edu/umd/cs/findbugs/annotations/NonNull",
    "edu/umd/cs/findbugs/annotations/Nullable",
    "edu/umd/cs/findbugs/annotations/CheckForNull",
    "org/checkerframework/checker/nullness/qual/NonNull",
    "org/checkerframework/checker/nullness/qual/Nullable",
    "org/checkerframework/checker/nullness/compatqual/NonNullDecl",
    "org/checkerframework/checker/nullness/compatqual/NullableDecl",
    "org/eclipse/jdt/annotation/NonNull",
    "org/eclipse/jdt/annotation/Nullable",
    "lombok/NonNull",
    "io/reactivex/annotations/NonNull",
    "io/reactivex/annotations/Nullable",
    "io/reactivex/rxjava3/annotations/NonNull",
    "io/reactivex/rxjava3/annotations/Nullable",
    "org/jspecify/annotations/NonNull",
    "org/jspecify/annotations/Nullable",
    "org/jspecify/annotations/NullMarked",
    "org/jspecify/annotations/NullUnmarked",
];

/// What must be recompiled after a tracked annotation change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecompileScope {
    /// Recompile users of the member.
    pub usages: bool,
    /// Recompile subclasses of the member's owner.
    pub subclasses: bool,
}

impl RecompileScope {
    /// No recompilation.
    pub const NONE: Self = Self { usages: false, subclasses: false };

    /// Nothing to recompile.
    pub fn is_empty(&self) -> bool {
        !self.usages && !self.subclasses
    }
}

/// Decides which annotation changes matter.
#[derive(Debug, Clone)]
pub struct AnnotationChangeTracker {
    tracked: BTreeSet<String>,
}

impl AnnotationChangeTracker {
    /// Tracker for the built-in nullability annotations.
    pub fn new() -> Self {
        Self::with_annotations(NULLABILITY_ANNOTATIONS.iter().copied())
    }

    /// Tracker for a custom annotation set.
    pub fn with_annotations<'s>(annotations: impl IntoIterator<Item = &'s str>) -> Self {
        Self { tracked: annotations.into_iter().map(str::to_string).collect() }
    }

    /// Whether the annotation type is tracked.
    pub fn is_tracked(&self, annotation: &str) -> bool {
        self.tracked.contains(annotation)
    }

    fn any_tracked(&self, annotations: &[&String]) -> bool {
        annotations.iter().any(|a| self.is_tracked(a))
    }

    /// Scope for annotation changes on a method.
    ///
    /// A non-final method may be overridden, so its subclasses are included.
    pub fn method_annotations_changed(&self, method: &JvmMethod, diff: &MethodDiff<'_>) -> RecompileScope {
        let changed = self.any_tracked(diff.annotations.added()) || self.any_tracked(diff.annotations.removed());
        if !changed {
            return RecompileScope::NONE;
        }
        RecompileScope { usages: true, subclasses: !method.is_final() }
    }

    /// Scope for annotation changes on a field: usages only.
    pub fn field_annotations_changed(&self, _field: &JvmField, diff: &FieldDiff<'_>) -> RecompileScope {
        let changed = self.any_tracked(diff.annotations.added()) || self.any_tracked(diff.annotations.removed());
        RecompileScope { usages: changed, subclasses: false }
    }
}

impl Default for AnnotationChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}
