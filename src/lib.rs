//! # recompile-kernel
//!
//! Incremental recompilation impact analysis for JVM and Kotlin builds.
//!
//! The kernel answers one question:
//!
//! > Given the classes a compilation round produced, which other sources
//! > **must be recompiled** for the build to stay correct?
//!
//! ## Core Contract
//!
//! 1. Keep a dependency graph of class nodes and the usages they record
//! 2. Diff a round's new nodes against the committed ones
//! 3. Apply Java and Kotlin compatibility rules to mark usages, nodes and
//!    sources as affected
//! 4. Report the affected sources, or that incremental compilation is unsafe
//!
//! ## Architecture
//!
//! ```text
//! FrontEnd → Delta → Differentiator → StrategyChain → DifferentiateResult
//!                         ↓                ↓
//!                   Utils (present / future views)
//!                         ↓
//!                       Graph
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same graph + same delta + same params → identical affected set
//! - Every collection in the graph and the result is ordered (BTreeMap/BTreeSet)
//! - Graph digests and result fingerprints use canonical serialization

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod diff;
pub mod graph;
pub mod delta;
pub mod utils;
pub mod kjvm;
pub mod params;
pub mod annotations;
pub mod context;
pub mod strategy;
pub mod differentiate;
pub mod driver;
pub mod canonical;

// Re-exports
pub use types::{
    ReferenceId, NodeSource, JvmFlags, Usage, ElemType,
    JvmClass, JvmMethod, JvmField, TypeRepr, RetentionPolicy, NodeMetadata,
    KotlinMeta, KmClass, KmClassKind, KmPackage, KmFunction, KmProperty, KmTypeAlias,
    KmType, KmValueParameter, JvmMemberSignature, Visibility, Modality,
};
pub use diff::{Change, Specifier, ClassDiff, MethodDiff, FieldDiff, DiffCapable, Difference};
pub use graph::{Graph, GraphError, GRAPH_FORMAT_VERSION};
pub use delta::Delta;
pub use utils::Utils;
pub use params::{DifferentiateParams, ParamsError, DEFAULT_MAX_ROUNDS};
pub use annotations::{AnnotationChangeTracker, RecompileScope};
pub use context::{DifferentiateContext, DifferentiateResult, UsageConstraint};
pub use strategy::{
    JvmDifferentiateStrategy, StrategyChain,
    JavaDifferentiateStrategy, KotlinAwareStrategy, SourceOnlyStrategy,
};
pub use differentiate::{differentiate, Differentiator};
pub use driver::{IncrementalDriver, FrontEnd, FrontEndError, DriverError, BuildOutcome};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};

/// Default parameter set version identifier.
pub const DEFAULT_PARAMS_VERSION: &str = "differentiate_params_v1";
