//! JVM access and property flags.
//!
//! The low 16 bits mirror the class-file `ACC_*` constants. The bits above
//! carry facts the front end derives from attributes (local, anonymous,
//! annotation-processor generated).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Access and property flags of a class, method or field.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
    pub struct JvmFlags: u32 {
        /// `public`.
        const PUBLIC = 0x0001;
        /// `private`.
        const PRIVATE = 0x0002;
        /// `protected`.
        const PROTECTED = 0x0004;
        /// `static`.
        const STATIC = 0x0008;
        /// `final`.
        const FINAL = 0x0010;
        /// `synchronized` (methods).
        const SYNCHRONIZED = 0x0020;
        /// `volatile` (fields).
        const VOLATILE = 0x0040;
        /// Bridge method (shares its bit with `VOLATILE`).
        const BRIDGE = 0x0040;
        /// `transient` (fields).
        const TRANSIENT = 0x0080;
        /// Varargs method (shares its bit with `TRANSIENT`).
        const VARARGS = 0x0080;
        /// `native`.
        const NATIVE = 0x0100;
        /// Interface.
        const INTERFACE = 0x0200;
        /// `abstract`.
        const ABSTRACT = 0x0400;
        /// `strictfp`.
        const STRICT = 0x0800;
        /// Compiler generated.
        const SYNTHETIC = 0x1000;
        /// Annotation type.
        const ANNOTATION = 0x2000;
        /// Enum type or constant.
        const ENUM = 0x4000;

        /// Local class.
        const LOCAL = 0x1_0000;
        /// Anonymous class.
        const ANONYMOUS = 0x2_0000;
        /// Produced by an annotation processor.
        const GENERATED = 0x4_0000;
    }
}

impl Default for JvmFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl JvmFlags {
    /// Flags present in `now` but not in `self`.
    pub fn added_in(self, now: JvmFlags) -> JvmFlags {
        now.difference(self)
    }

    /// Flags present in `self` but not in `now`.
    pub fn removed_in(self, now: JvmFlags) -> JvmFlags {
        self.difference(now)
    }

    /// `public`.
    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    /// `private`.
    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    /// `protected`.
    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    /// Neither public, protected nor private.
    pub fn is_package_local(self) -> bool {
        !self.intersects(Self::PUBLIC | Self::PROTECTED | Self::PRIVATE)
    }

    /// `static`.
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// `final`.
    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    /// `abstract`.
    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    /// Interface type.
    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    /// Annotation type.
    pub fn is_annotation(self) -> bool {
        self.contains(Self::ANNOTATION)
    }

    /// Enum type.
    pub fn is_enum(self) -> bool {
        self.contains(Self::ENUM)
    }

    /// Synthetic member or class.
    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    /// Bridge method.
    pub fn is_bridge(self) -> bool {
        self.contains(Self::BRIDGE)
    }

    /// Volatile field.
    pub fn is_volatile(self) -> bool {
        self.contains(Self::VOLATILE)
    }

    /// Annotation-processor output.
    pub fn is_generated(self) -> bool {
        self.contains(Self::GENERATED)
    }

    /// Rank of the access level: private < package-local < protected < public.
    fn access_rank(self) -> u8 {
        if self.is_private() {
            0
        } else if self.is_package_local() {
            1
        } else if self.is_protected() {
            2
        } else {
            3
        }
    }

    /// Whether `self` grants weaker access than `other`.
    pub fn is_weaker_access(self, other: JvmFlags) -> bool {
        self.access_rank() < other.access_rank()
    }
}
