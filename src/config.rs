//! Engine configuration.
//!
//! Every weight, threshold and timeout the pipeline uses lives here with a
//! compiled default. A TOML file only needs the keys it changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action::PolicyRule;
use crate::confidence::{ConfidenceThresholds, ResolutionWeights};
use crate::error::ValidationError;
use crate::rank::RankWeights;

/// Tunables of a [`crate::SearchEngine`].
///
/// ```
/// use fleetql::EngineConfig;
///
/// let config = EngineConfig::from_toml_str(
///     r#"
///     extraction_timeout_ms = 300
///
///     [thresholds]
///     gate_high = 0.7
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.extraction_timeout_ms, 300);
/// assert!((config.thresholds.gate_high - 0.7).abs() < f32::EPSILON);
/// assert!((config.thresholds.gate_mid - 0.6).abs() < f32::EPSILON);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Resolution stage weights.
    pub resolution_weights: ResolutionWeights,
    /// Confidence and gate thresholds.
    pub thresholds: ConfidenceThresholds,
    /// Ranking weights.
    pub rank_weights: RankWeights,
    /// Timeout of the model extraction call.
    pub extraction_timeout_ms: u64,
    /// Timeout of one vector-similarity call.
    pub embedding_timeout_ms: u64,
    /// Deadline for the whole resolution fan-out.
    pub resolution_timeout_ms: u64,
    /// Overall deadline of one search, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    /// Neighbors requested from the vector index.
    pub vector_k: usize,
    /// Minimum label similarity for a graph-label hit.
    pub min_label_similarity: f32,
    /// Minimum cosine similarity for a vector hit.
    pub min_vector_similarity: f32,
    /// Maximum result items per response.
    pub max_results: usize,
    /// Queries longer than this are blocked.
    pub max_query_chars: usize,
    /// Role policy rows. The built-in table is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<Vec<PolicyRule>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution_weights: ResolutionWeights::default(),
            thresholds: ConfidenceThresholds::default(),
            rank_weights: RankWeights::default(),
            extraction_timeout_ms: 800,
            embedding_timeout_ms: 500,
            resolution_timeout_ms: 2_000,
            request_timeout_ms: None,
            vector_k: 5,
            min_label_similarity: 0.75,
            min_vector_similarity: 0.75,
            max_results: 20,
            max_query_chars: 512,
            policy: None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` on a parse error, or the
    /// validation error of the first bad value.
    pub fn from_toml_str(s: &str) -> Result<Self, ValidationError> {
        let config: Self = toml::from_str(s).map_err(|e| ValidationError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if the file cannot be read or
    /// parsed, or the validation error of the first bad value.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidConfig {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Checks every value.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.resolution_weights.validate()?;
        self.thresholds.validate()?;
        self.rank_weights.validate()?;

        for (field, value) in [
            ("extraction_timeout_ms", self.extraction_timeout_ms),
            ("embedding_timeout_ms", self.embedding_timeout_ms),
            ("resolution_timeout_ms", self.resolution_timeout_ms),
        ] {
            if value == 0 {
                return Err(positive(field, value));
            }
        }
        if let Some(ms) = self.request_timeout_ms.filter(|&ms| ms == 0) {
            return Err(positive("request_timeout_ms", ms));
        }
        for (field, value) in [
            ("vector_k", self.vector_k),
            ("max_results", self.max_results),
            ("max_query_chars", self.max_query_chars),
        ] {
            if value == 0 {
                return Err(positive(field, 0));
            }
        }
        crate::confidence::validate_unit("min_label_similarity", self.min_label_similarity)?;
        crate::confidence::validate_unit("min_vector_similarity", self.min_vector_similarity)?;
        Ok(())
    }

    /// Extraction timeout as a `Duration`.
    #[must_use]
    pub const fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    /// Embedding timeout as a `Duration`.
    #[must_use]
    pub const fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    /// Resolution fan-out deadline as a `Duration`.
    #[must_use]
    pub const fn resolution_timeout(&self) -> Duration {
        Duration::from_millis(self.resolution_timeout_ms)
    }

    /// Request deadline as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[allow(clippy::cast_precision_loss)]
fn positive(field: &str, value: u64) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        value: value as f64,
        min: 1.0,
        max: f64::MAX,
    }
}
