//! Multi-round incremental build driver.
//!
//! The driver owns the dependency graph and repeatedly asks a [`FrontEnd`]
//! to compile a set of sources, differentiates the result and feeds the
//! affected sources into the next round until nothing is left to compile.
//!
//! ## Round
//!
//! 1. Compile the pending sources
//! 2. Build a [`Delta`] from the produced nodes (and the deletions, first round only)
//! 3. Differentiate; a non-incremental result stops the build
//! 4. If the round changed no classes and compiled only Kotlin sources, run a
//!    source-only pass over the same sources
//! 5. Commit the delta to the graph
//! 6. The affected sources become the next round's pending set
//!
//! The graph lives behind an `Arc<RwLock<_>>` so readers (IDE queries,
//! progress reporting) can inspect it between rounds.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::diff::deep_diff;
use crate::differentiate::Differentiator;
use crate::graph::Graph;
use crate::delta::Delta;
use crate::params::DifferentiateParams;
use crate::types::{JvmClass, NodeSource};

/// Error type for front end failures.
#[derive(Debug, thiserror::Error)]
pub enum FrontEndError {
    /// A source did not compile.
    #[error("Compilation failed for {file}: {message}")]
    Compilation {
        /// Failing source.
        file: NodeSource,
        /// Compiler message.
        message: String,
    },
    /// The compiler could not be run at all.
    #[error("Front end unavailable: {0}")]
    Unavailable(String),
}

/// Error type for driver operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The front end failed during a round.
    #[error("Front end failed in round {round}: {source}")]
    FrontEnd {
        /// 1-based round number.
        round: usize,
        /// Underlying failure.
        #[source]
        source: FrontEndError,
    },
}

/// A compiler producing class nodes for source files.
pub trait FrontEnd {
    /// Compile the sources and return the nodes each one produced.
    ///
    /// Every requested source should appear in the output; a source missing
    /// from the output is treated as producing no classes.
    fn compile(&mut self, sources: &BTreeSet<NodeSource>) -> Result<Vec<(NodeSource, Vec<JvmClass>)>, FrontEndError>;
}

/// Result of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The build converged incrementally.
    Incremental {
        /// Rounds run.
        rounds: usize,
        /// Every source compiled during the build.
        compiled: BTreeSet<NodeSource>,
    },
    /// The build must fall back to compiling everything.
    FullRebuildRequired {
        /// Why incremental compilation was abandoned.
        reason: String,
        /// Rounds run before giving up.
        rounds: usize,
    },
}

impl BuildOutcome {
    /// The build finished without requiring a full rebuild.
    pub fn is_incremental(&self) -> bool {
        matches!(self, Self::Incremental { .. })
    }

    /// Rounds run.
    pub fn rounds(&self) -> usize {
        match self {
            Self::Incremental { rounds, .. } | Self::FullRebuildRequired { rounds, .. } => *rounds,
        }
    }
}

/// Drives compile/differentiate rounds over a shared graph.
pub struct IncrementalDriver<F: FrontEnd> {
    graph: Arc<RwLock<Graph>>,
    params: DifferentiateParams,
    differentiator: Differentiator,
    front_end: F,
}

impl<F: FrontEnd> IncrementalDriver<F> {
    /// Create a driver over an existing graph.
    pub fn new(graph: Graph, params: DifferentiateParams, front_end: F) -> Self {
        Self {
            graph: Arc::new(RwLock::new(graph)),
            params,
            differentiator: Differentiator::default(),
            front_end,
        }
    }

    /// Replace the differentiator (custom strategy chain).
    pub fn with_differentiator(mut self, differentiator: Differentiator) -> Self {
        self.differentiator = differentiator;
        self
    }

    /// Shared handle to the graph.
    pub fn graph(&self) -> Arc<RwLock<Graph>> {
        Arc::clone(&self.graph)
    }

    /// Parameters used for every pass.
    pub fn params(&self) -> &DifferentiateParams {
        &self.params
    }

    /// The front end.
    pub fn front_end(&self) -> &F {
        &self.front_end
    }

    /// Build after `changed` sources were edited and `deleted` ones removed.
    ///
    /// Stops with [`BuildOutcome::FullRebuildRequired`] when a pass is
    /// non-incremental or when `max_rounds` rounds did not reach a fixed point.
    /// On a front end error the graph keeps every round committed so far.
    pub fn build(
        &mut self,
        changed: impl IntoIterator<Item = NodeSource>,
        deleted: impl IntoIterator<Item = NodeSource>,
    ) -> Result<BuildOutcome, DriverError> {
        let mut deleted: BTreeSet<NodeSource> = deleted.into_iter().collect();
        let mut pending: BTreeSet<NodeSource> = changed.into_iter().filter(|s| !deleted.contains(s)).collect();
        let mut compiled: BTreeSet<NodeSource> = BTreeSet::new();
        let mut round = 0;

        while !pending.is_empty() || !deleted.is_empty() {
            if round >= self.params.max_rounds {
                tracing::warn!(
                    rounds = round,
                    pending = pending.len(),
                    "Build did not converge, falling back to full rebuild"
                );
                return Ok(BuildOutcome::FullRebuildRequired {
                    reason: format!("no fixed point after {round} rounds"),
                    rounds: round,
                });
            }
            round += 1;

            let span = tracing::info_span!("round", round, pending = pending.len(), deleted = deleted.len());
            let _guard = span.enter();

            let output = self
                .front_end
                .compile(&pending)
                .map_err(|source| DriverError::FrontEnd { round, source })?;

            let mut graph = self.graph.write();
            let mut delta = Delta::new(&graph, pending.iter().cloned(), std::mem::take(&mut deleted));
            for (source, nodes) in output {
                delta.associate(&graph, source, nodes);
            }

            let mut result = self.differentiator.differentiate(&graph, &delta, &self.params);
            if result.is_incremental() && is_source_only_round(&delta) {
                let source_only = Delta::source_only(&graph, delta.base_sources().iter().cloned());
                let extra = self.differentiator.differentiate(&graph, &source_only, &self.params);
                result
                    .affected_sources
                    .extend(extra.affected_sources.into_iter().filter(|s| !compiled.contains(s)));
                result.affected_nodes.extend(extra.affected_nodes);
                result.non_incremental_reasons.extend(extra.non_incremental_reasons);
            }

            if !result.is_incremental() {
                let reason = result.non_incremental_reasons.join("; ");
                tracing::info!(round, reason = %reason, "Incremental build abandoned");
                return Ok(BuildOutcome::FullRebuildRequired { reason, rounds: round });
            }

            graph.apply(&delta);
            compiled.extend(delta.base_sources().iter().cloned());
            tracing::info!(
                round,
                compiled = delta.base_sources().len(),
                affected = result.affected_sources.len(),
                "Round committed"
            );
            pending = result.affected_sources;
        }

        Ok(BuildOutcome::Incremental { rounds: round, compiled })
    }
}

impl<F: FrontEnd + std::fmt::Debug> std::fmt::Debug for IncrementalDriver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalDriver")
            .field("params", &self.params)
            .field("differentiator", &self.differentiator)
            .field("front_end", &self.front_end)
            .finish_non_exhaustive()
    }
}

/// Kotlin-only round whose recompilation produced identical classes.
fn is_source_only_round(delta: &Delta) -> bool {
    !delta.base_sources().is_empty()
        && delta.deleted_sources().is_empty()
        && delta.base_sources().iter().all(NodeSource::is_kotlin)
        && deep_diff(delta.nodes_before(), delta.nodes_after()).unchanged()
}
