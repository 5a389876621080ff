//! Differentiation parameters.
//!
//! Loaded from JSON by the driver and validated on load. Every field has a
//! default, so `{}` is a valid configuration.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::types::NodeSource;
use crate::DEFAULT_PARAMS_VERSION;

/// Default cap on driver rounds before falling back to a full rebuild.
pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// Error type for parameter loading.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    /// Input is not valid parameter JSON.
    #[error("Invalid params JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// An affection filter pattern does not compile.
    #[error("Invalid affection filter pattern {pattern:?}: {reason}")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
    /// `max_rounds` is zero.
    #[error("max_rounds must be greater than zero")]
    ZeroRounds,
}

/// Parameters of a differentiation pass.
///
/// ## Parameters
///
/// - `process_constants_incrementally`: recompile constant users instead of rebuilding
/// - `affection_exclude`: source path patterns never reported as affected
/// - `max_rounds`: driver iteration cap
/// - `calculate_affected`: propagate impact through usages at all
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentiateParams {
    /// Parameter set version identifier.
    pub version: String,
    /// Handle changed compile-time constants by recompiling their users.
    ///
    /// When false, such changes request a full rebuild.
    pub process_constants_incrementally: bool,
    /// Regular expressions over source paths excluded from the affected set.
    pub affection_exclude: Vec<String>,
    /// Maximum number of driver rounds.
    pub max_rounds: usize,
    /// Compute affected sources from usages.
    pub calculate_affected: bool,
    #[serde(skip)]
    exclude: Vec<Regex>,
}

impl DifferentiateParams {
    /// Parse and validate parameters from JSON.
    pub fn from_json(json: &str) -> Result<Self, ParamsError> {
        let params: Self = serde_json::from_str(json)?;
        params.validated()
    }

    /// Validate and compile the affection filter.
    pub fn validated(mut self) -> Result<Self, ParamsError> {
        if self.max_rounds == 0 {
            return Err(ParamsError::ZeroRounds);
        }
        self.exclude = self
            .affection_exclude
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ParamsError::Pattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Add an exclusion pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Result<Self, ParamsError> {
        self.affection_exclude.push(pattern.into());
        self.validated()
    }

    /// Whether a source may be reported as affected.
    pub fn is_affectable(&self, source: &NodeSource) -> bool {
        !self.exclude.iter().any(|re| re.is_match(source.path()))
    }

    /// Hash of the parameters, for cache keys.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(self)
    }
}

impl Default for DifferentiateParams {
    fn default() -> Self {
        Self {
            version: DEFAULT_PARAMS_VERSION.to_string(),
            process_constants_incrementally: true,
            affection_exclude: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            calculate_affected: true,
            exclude: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let params = DifferentiateParams::from_json("{}").unwrap();
        assert!(params.process_constants_incrementally);
        assert!(params.calculate_affected);
        assert_eq!(params.max_rounds, DEFAULT_MAX_ROUNDS);
    }

    #[test]
    fn test_affection_filter() {
        let params = DifferentiateParams::from_json(r#"{"affection_exclude": ["^generated/"]}"#).unwrap();
        assert!(!params.is_affectable(&NodeSource::new("generated/Foo.java")));
        assert!(params.is_affectable(&NodeSource::new("src/Foo.java")));
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(matches!(
            DifferentiateParams::from_json(r#"{"max_rounds": 0}"#),
            Err(ParamsError::ZeroRounds)
        ));
        assert!(matches!(
            DifferentiateParams::from_json(r#"{"affection_exclude": ["("]}"#),
            Err(ParamsError::Pattern { .. })
        ));
        assert!(matches!(DifferentiateParams::from_json("[1]"), Err(ParamsError::Json(_))));
    }

    #[test]
    fn test_params_hash_determinism() {
        let a = DifferentiateParams::default();
        let b = DifferentiateParams::from_json("{}").unwrap();
        assert_eq!(a.params_hash(), b.params_hash());

        let c = DifferentiateParams::default().exclude("x").unwrap();
        assert_ne!(a.params_hash(), c.params_hash());
    }
}
