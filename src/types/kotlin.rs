//! Parsed Kotlin metadata attached to JVM class nodes.
//!
//! The front end reads the `kotlin.Metadata` annotation of a class file and
//! hands over this already-decoded structure. Only the facts the
//! differentiation rules consult are kept.

use serde::{Deserialize, Serialize};

/// Kotlin declaration visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// `public`.
    Public,
    /// `protected`.
    Protected,
    /// `internal`.
    Internal,
    /// `private`.
    Private,
    /// `private` to the instance (`private[this]`).
    PrivateToThis,
    /// Local declaration.
    Local,
}

impl Visibility {
    /// Private in any flavour.
    pub fn is_private(self) -> bool {
        matches!(self, Self::Private | Self::PrivateToThis | Self::Local)
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Public
    }
}

/// Kotlin declaration modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    /// `final`.
    Final,
    /// `open`.
    Open,
    /// `abstract`.
    Abstract,
    /// `sealed`.
    Sealed,
}

impl Default for Modality {
    fn default() -> Self {
        Self::Final
    }
}

/// A Kotlin type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KmType {
    /// Classifier name (`kotlin/String`, `a/b/Foo`).
    pub classifier: String,
    /// Whether the type is marked nullable (`T?`).
    pub nullable: bool,
}

impl KmType {
    /// Non-null type.
    pub fn not_null(classifier: impl Into<String>) -> Self {
        Self { classifier: classifier.into(), nullable: false }
    }

    /// Nullable type.
    pub fn nullable(classifier: impl Into<String>) -> Self {
        Self { classifier: classifier.into(), nullable: true }
    }
}

/// JVM name + descriptor of a Kotlin declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JvmMemberSignature {
    /// JVM name.
    pub name: String,
    /// JVM descriptor.
    pub descriptor: String,
}

impl JvmMemberSignature {
    /// Create a signature.
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self { name: name.into(), descriptor: descriptor.into() }
    }

    /// Whether the signature names the given JVM member.
    pub fn matches(&self, name: &str, descriptor: &str) -> bool {
        self.name == name && self.descriptor == descriptor
    }
}

/// A value parameter of a Kotlin function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KmValueParameter {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: KmType,
}

/// A Kotlin function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KmFunction {
    /// Kotlin name.
    pub name: String,
    /// Signature of the JVM method implementing it, when known.
    pub jvm_signature: Option<JvmMemberSignature>,
    /// Visibility.
    pub visibility: Visibility,
    /// Modality.
    pub modality: Modality,
    /// `operator` modifier.
    pub is_operator: bool,
    /// `inline` modifier.
    pub is_inline: bool,
    /// Extension receiver type.
    pub receiver: Option<KmType>,
    /// Value parameters.
    pub value_parameters: Vec<KmValueParameter>,
    /// Return type.
    pub return_type: KmType,
}

impl KmFunction {
    /// Public final function with no parameters.
    pub fn new(name: impl Into<String>, return_type: KmType) -> Self {
        Self {
            name: name.into(),
            jvm_signature: None,
            visibility: Visibility::Public,
            modality: Modality::Final,
            is_operator: false,
            is_inline: false,
            receiver: None,
            value_parameters: Vec::new(),
            return_type,
        }
    }

    /// Set the implementing JVM method.
    pub fn with_jvm_signature(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.jvm_signature = Some(JvmMemberSignature::new(name, descriptor));
        self
    }

    /// Add a value parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, ty: KmType) -> Self {
        self.value_parameters.push(KmValueParameter { name: name.into(), ty });
        self
    }

    /// Mark as `operator`.
    pub fn operator(mut self) -> Self {
        self.is_operator = true;
        self
    }

    /// Mark as `inline`.
    pub fn inline(mut self) -> Self {
        self.is_inline = true;
        self
    }

    /// Set visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// A Kotlin property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KmProperty {
    /// Kotlin name.
    pub name: String,
    /// Visibility.
    pub visibility: Visibility,
    /// `var` rather than `val`.
    pub is_var: bool,
    /// `const val`.
    pub is_const: bool,
    /// Property type.
    pub return_type: KmType,
    /// JVM getter, when one is generated.
    pub getter: Option<JvmMemberSignature>,
    /// JVM setter, when one is generated.
    pub setter: Option<JvmMemberSignature>,
}

impl KmProperty {
    /// Public `val` with no accessors.
    pub fn new(name: impl Into<String>, return_type: KmType) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_var: false,
            is_const: false,
            return_type,
            getter: None,
            setter: None,
        }
    }

    /// Set the JVM getter.
    pub fn with_getter(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.getter = Some(JvmMemberSignature::new(name, descriptor));
        self
    }

    /// Set the JVM setter and mark as `var`.
    pub fn with_setter(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.setter = Some(JvmMemberSignature::new(name, descriptor));
        self.is_var = true;
        self
    }
}

/// A Kotlin type alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KmTypeAlias {
    /// Alias name.
    pub name: String,
    /// Visibility.
    pub visibility: Visibility,
}

/// Kind of Kotlin class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KmClassKind {
    /// Regular class.
    Class,
    /// Interface.
    Interface,
    /// `fun interface`.
    FunInterface,
    /// Enum class.
    EnumClass,
    /// `object`.
    Object,
    /// `companion object`.
    CompanionObject,
    /// Annotation class.
    AnnotationClass,
}

/// Metadata of a Kotlin class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KmClass {
    /// Kotlin name (`a/b/Outer.Inner`).
    pub name: String,
    /// Class kind.
    pub kind: KmClassKind,
    /// Visibility.
    pub visibility: Visibility,
    /// Modality.
    pub modality: Modality,
    /// Subclasses listed for a sealed class.
    pub sealed_subclasses: Vec<String>,
    /// Member functions.
    pub functions: Vec<KmFunction>,
    /// Member properties.
    pub properties: Vec<KmProperty>,
    /// Nested type aliases.
    pub type_aliases: Vec<KmTypeAlias>,
}

/// Metadata of a Kotlin file facade (top-level declarations).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KmPackage {
    /// Top-level functions.
    pub functions: Vec<KmFunction>,
    /// Top-level properties.
    pub properties: Vec<KmProperty>,
    /// Top-level type aliases.
    pub type_aliases: Vec<KmTypeAlias>,
}

/// Parsed Kotlin declaration container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KotlinMeta {
    /// A Kotlin class.
    Class(KmClass),
    /// A file facade or multi-file class part.
    Package(KmPackage),
    /// Synthetic class (lambda, `$WhenMappings`, ...): no declarations.
    Synthetic,
}

impl KotlinMeta {
    /// Class metadata with default flags.
    pub fn class(name: impl Into<String>) -> KmClass {
        KmClass {
            name: name.into(),
            kind: KmClassKind::Class,
            visibility: Visibility::Public,
            modality: Modality::Final,
            sealed_subclasses: Vec::new(),
            functions: Vec::new(),
            properties: Vec::new(),
            type_aliases: Vec::new(),
        }
    }

    /// Declared functions.
    pub fn functions(&self) -> &[KmFunction] {
        match self {
            Self::Class(c) => &c.functions,
            Self::Package(p) => &p.functions,
            Self::Synthetic => &[],
        }
    }

    /// Declared properties.
    pub fn properties(&self) -> &[KmProperty] {
        match self {
            Self::Class(c) => &c.properties,
            Self::Package(p) => &p.properties,
            Self::Synthetic => &[],
        }
    }

    /// Declared type aliases.
    pub fn type_aliases(&self) -> &[KmTypeAlias] {
        match self {
            Self::Class(c) => &c.type_aliases,
            Self::Package(p) => &p.type_aliases,
            Self::Synthetic => &[],
        }
    }

    /// Class metadata, if this container is a class.
    pub fn as_class(&self) -> Option<&KmClass> {
        match self {
            Self::Class(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_accessors() {
        let mut cls = KotlinMeta::class("a/Foo");
        cls.functions.push(KmFunction::new("bar", KmType::not_null("kotlin/Unit")));
        let meta = KotlinMeta::Class(cls);
        assert_eq!(meta.functions().len(), 1);
        assert!(meta.properties().is_empty());
        assert!(meta.as_class().is_some());
        assert!(KotlinMeta::Synthetic.functions().is_empty());
    }

    #[test]
    fn test_visibility_private() {
        assert!(Visibility::Private.is_private());
        assert!(Visibility::PrivateToThis.is_private());
        assert!(!Visibility::Internal.is_private());
    }
}
