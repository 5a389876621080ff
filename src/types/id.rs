//! Identifier types for the dependency graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node in the dependency graph.
///
/// For JVM nodes this is the internal class name (`a/b/Outer$Inner`).
/// Packages are addressed with the same type (`a/b`) when a usage is owned
/// by a package rather than a class. Equality is by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceId(String);

impl ReferenceId {
    /// Create a new reference id from an internal name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the internal name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Package part of the name (`a/b` for `a/b/Foo`), empty for the default package.
    pub fn package_name(&self) -> &str {
        package_of(&self.0)
    }
}

/// Package part of an internal class name.
pub fn package_of(internal_name: &str) -> &str {
    match internal_name.rfind('/') {
        Some(idx) => &internal_name[..idx],
        None => "",
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReferenceId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ReferenceId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A source file (or source unit) that produced one or more nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeSource(String);

impl NodeSource {
    /// Create a node source from a path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the source path.
    pub fn path(&self) -> &str {
        &self.0
    }

    /// Whether the source is a Kotlin source file.
    pub fn is_kotlin(&self) -> bool {
        self.0.ends_with(".kt") || self.0.ends_with(".kts")
    }
}

impl fmt::Display for NodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeSource {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}
