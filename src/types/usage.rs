//! Usage facts: references one node makes to symbols owned by another.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::id::ReferenceId;

/// Program element an annotation may be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElemType {
    /// Class, interface or enum declaration.
    Type,
    /// Field declaration.
    Field,
    /// Method declaration.
    Method,
    /// Formal parameter.
    Parameter,
    /// Constructor declaration.
    Constructor,
    /// Local variable declaration.
    LocalVariable,
    /// Annotation type declaration.
    AnnotationType,
    /// Package declaration.
    Package,
    /// Type parameter declaration.
    TypeParameter,
    /// Use of a type.
    TypeUse,
    /// Module declaration.
    Module,
    /// Record component.
    RecordComponent,
}

/// A recorded reference from a node to a symbol.
///
/// Every variant has an element owner (see [`Usage::element_owner`]) that the
/// graph indexes to answer "who depends on X".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Usage {
    /// Reference to a class by name.
    Class {
        /// Referenced class.
        owner: ReferenceId,
    },
    /// Instantiation of a class, including lambda instantiation of a SAM type.
    ClassNew {
        /// Instantiated class.
        owner: ReferenceId,
    },
    /// Class used as a generic type parameter bound.
    ClassAsGenericBound {
        /// Bound class.
        owner: ReferenceId,
    },
    /// Method call or reference.
    Method {
        /// Class the method was resolved against.
        owner: ReferenceId,
        /// Method name.
        name: String,
        /// JVM method descriptor.
        descriptor: String,
    },
    /// Field read.
    Field {
        /// Class the field was resolved against.
        owner: ReferenceId,
        /// Field name.
        name: String,
        /// JVM field descriptor.
        descriptor: String,
    },
    /// Field write.
    FieldAssign {
        /// Class the field was resolved against.
        owner: ReferenceId,
        /// Field name.
        name: String,
        /// JVM field descriptor.
        descriptor: String,
    },
    /// `import static Owner.member`.
    ImportStaticMember {
        /// Class the member is imported from.
        owner: ReferenceId,
        /// Imported member name.
        name: String,
    },
    /// `import static Owner.*`.
    ImportStaticOnDemand {
        /// Class the members are imported from.
        owner: ReferenceId,
    },
    /// `import package.*`.
    ImportPackageOnDemand {
        /// Imported package, in internal form (`a/b`).
        package: String,
    },
    /// Name lookup recorded by the Kotlin compiler in a scope.
    LookupName {
        /// Scope the name was looked up in (package or class).
        owner: ReferenceId,
        /// Looked up name.
        name: String,
    },
    /// Annotation application.
    Annotation {
        /// Annotation type.
        owner: ReferenceId,
        /// Attribute names given explicitly at the use site.
        used_arg_names: Vec<String>,
        /// Element kinds the annotation was applied to.
        targets: Vec<ElemType>,
    },
}

impl Usage {
    /// Class usage.
    pub fn class(owner: impl Into<ReferenceId>) -> Self {
        Self::Class { owner: owner.into() }
    }

    /// Instantiation usage.
    pub fn class_new(owner: impl Into<ReferenceId>) -> Self {
        Self::ClassNew { owner: owner.into() }
    }

    /// Method usage.
    pub fn method(owner: impl Into<ReferenceId>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self::Method {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Field read usage.
    pub fn field(owner: impl Into<ReferenceId>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self::Field {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Kotlin name lookup usage.
    pub fn lookup(owner: impl Into<ReferenceId>, name: impl Into<String>) -> Self {
        Self::LookupName {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Package on-demand import usage.
    pub fn import_package_on_demand(package: impl Into<String>) -> Self {
        Self::ImportPackageOnDemand { package: package.into() }
    }

    /// The id that owns the referenced element.
    pub fn element_owner(&self) -> ReferenceId {
        match self {
            Self::Class { owner }
            | Self::ClassNew { owner }
            | Self::ClassAsGenericBound { owner }
            | Self::Method { owner, .. }
            | Self::Field { owner, .. }
            | Self::FieldAssign { owner, .. }
            | Self::ImportStaticMember { owner, .. }
            | Self::ImportStaticOnDemand { owner }
            | Self::LookupName { owner, .. }
            | Self::Annotation { owner, .. } => owner.clone(),
            Self::ImportPackageOnDemand { package } => ReferenceId::new(package.clone()),
        }
    }

    /// Name of the referenced member, if the usage targets a member.
    pub fn member_name(&self) -> Option<&str> {
        match self {
            Self::Method { name, .. }
            | Self::Field { name, .. }
            | Self::FieldAssign { name, .. }
            | Self::ImportStaticMember { name, .. }
            | Self::LookupName { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class { owner } => write!(f, "class {owner}"),
            Self::ClassNew { owner } => write!(f, "new {owner}"),
            Self::ClassAsGenericBound { owner } => write!(f, "bound {owner}"),
            Self::Method { owner, name, descriptor } => write!(f, "method {owner}.{name}{descriptor}"),
            Self::Field { owner, name, .. } => write!(f, "field {owner}.{name}"),
            Self::FieldAssign { owner, name, .. } => write!(f, "field assign {owner}.{name}"),
            Self::ImportStaticMember { owner, name } => write!(f, "import static {owner}.{name}"),
            Self::ImportStaticOnDemand { owner } => write!(f, "import static {owner}.*"),
            Self::ImportPackageOnDemand { package } => write!(f, "import {package}.*"),
            Self::LookupName { owner, name } => write!(f, "lookup {owner}:{name}"),
            Self::Annotation { owner, .. } => write!(f, "@{owner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_owner() {
        assert_eq!(Usage::method("a/Foo", "bar", "()V").element_owner(), ReferenceId::new("a/Foo"));
        assert_eq!(Usage::import_package_on_demand("a/b").element_owner(), ReferenceId::new("a/b"));
        assert_eq!(Usage::lookup("a", "foo").element_owner(), ReferenceId::new("a"));
    }

    #[test]
    fn test_member_name() {
        assert_eq!(Usage::field("a/Foo", "x", "I").member_name(), Some("x"));
        assert_eq!(Usage::class("a/Foo").member_name(), None);
    }
}
