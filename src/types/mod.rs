//! Core types for the dependency graph.

pub mod id;
pub mod flags;
pub mod usage;
pub mod kotlin;
pub mod node;

pub use id::{ReferenceId, NodeSource};
pub use flags::JvmFlags;
pub use usage::{Usage, ElemType};
pub use kotlin::{
    KotlinMeta, KmClass, KmClassKind, KmPackage, KmFunction, KmProperty, KmTypeAlias,
    KmType, KmValueParameter, JvmMemberSignature, Visibility, Modality,
};
pub use node::{JvmClass, JvmMethod, JvmField, TypeRepr, RetentionPolicy, NodeMetadata, OBJECT_CLASS_NAME};
