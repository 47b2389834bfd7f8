//! Resolution confidence.
//!
//! A resolved entity's confidence is not a single opaque number: it keeps the
//! four per-stage sub-scores of the resolution cascade so callers can see
//! *why* an entity was (or was not) trusted. The total is the weighted sum of
//! the sub-scores; stages that never ran contribute 0.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The four stages of the resolution cascade, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    /// Deterministic text → canonical-token rule.
    CanonicalRule,
    /// Tenant alias table lookup.
    AliasTable,
    /// Graph node label match.
    GraphLabel,
    /// Embedding nearest-neighbor fallback.
    VectorSimilarity,
}

impl ResolutionStage {
    /// Stages in cascade order.
    pub const ORDER: [Self; 4] = [
        Self::CanonicalRule,
        Self::AliasTable,
        Self::GraphLabel,
        Self::VectorSimilarity,
    ];
}

impl fmt::Display for ResolutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CanonicalRule => write!(f, "canonical_rule"),
            Self::AliasTable => write!(f, "alias_table"),
            Self::GraphLabel => write!(f, "graph_label"),
            Self::VectorSimilarity => write!(f, "vector_similarity"),
        }
    }
}

/// Per-stage weights. Defaults: 0.40 / 0.30 / 0.20 / 0.10.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionWeights {
    /// Weight of the canonical-rule (pattern) score.
    pub pattern: f32,
    /// Weight of the alias-table score.
    pub alias: f32,
    /// Weight of the graph-label score.
    pub graph_label: f32,
    /// Weight of the embedding-similarity score.
    pub embedding: f32,
}

impl Default for ResolutionWeights {
    fn default() -> Self {
        Self {
            pattern: 0.40,
            alias: 0.30,
            graph_label: 0.20,
            embedding: 0.10,
        }
    }
}

impl ResolutionWeights {
    /// Returns the weight of a stage.
    #[must_use]
    pub const fn for_stage(&self, stage: ResolutionStage) -> f32 {
        match stage {
            ResolutionStage::CanonicalRule => self.pattern,
            ResolutionStage::AliasTable => self.alias,
            ResolutionStage::GraphLabel => self.graph_label,
            ResolutionStage::VectorSimilarity => self.embedding,
        }
    }

    /// Validates ranges and that the weights sum to 1.0.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any weight is outside [0, 1] or the sum is not 1.0.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("resolution_weights.pattern", self.pattern),
            ("resolution_weights.alias", self.alias),
            ("resolution_weights.graph_label", self.graph_label),
            ("resolution_weights.embedding", self.embedding),
        ];
        for (field, value) in fields {
            validate_unit(field, value)?;
        }
        let sum = self.pattern + self.alias + self.graph_label + self.embedding;
        if (sum - 1.0).abs() > 1e-3 {
            return Err(ValidationError::WeightsDoNotSum {
                group: "resolution_weights".to_string(),
                sum: f64::from(sum),
            });
        }
        Ok(())
    }
}

/// Confidence cut-offs. Defaults: confident at total ≥ 0.6 or pattern ≥ 0.8;
/// action gate tiers at 0.8 and 0.6.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    /// Total at or above which an entity counts as confident.
    pub confident_total: f32,
    /// Pattern sub-score at or above which an entity counts as confident.
    pub confident_pattern: f32,
    /// Gate tier enabling every policy-allowed action.
    pub gate_high: f32,
    /// Gate tier enabling write actions with confirmation.
    pub gate_mid: f32,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            confident_total: 0.6,
            confident_pattern: 0.8,
            gate_high: 0.8,
            gate_mid: 0.6,
        }
    }
}

impl ConfidenceThresholds {
    /// Validates ranges and tier ordering.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` on an out-of-range value or when `gate_mid > gate_high`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_unit("thresholds.confident_total", self.confident_total)?;
        validate_unit("thresholds.confident_pattern", self.confident_pattern)?;
        validate_unit("thresholds.gate_high", self.gate_high)?;
        validate_unit("thresholds.gate_mid", self.gate_mid)?;
        if self.gate_mid > self.gate_high {
            return Err(ValidationError::ThresholdOrder {
                reason: format!(
                    "gate_mid ({}) must not exceed gate_high ({})",
                    self.gate_mid, self.gate_high
                ),
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_unit(field: &str, value: f32) -> Result<(), ValidationError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value: f64::from(value),
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

/// Raw per-stage scores in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageScores {
    /// Canonical-rule score (`regex_score`).
    pub pattern: f32,
    /// Alias-table score.
    pub alias: f32,
    /// Graph-label score.
    pub graph_label: f32,
    /// Embedding-similarity score.
    pub embedding: f32,
}

impl StageScores {
    /// Records a stage score, clamped to [0, 1]. NaN is recorded as 0.
    pub fn record(&mut self, stage: ResolutionStage, score: f32) {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        match stage {
            ResolutionStage::CanonicalRule => self.pattern = score,
            ResolutionStage::AliasTable => self.alias = score,
            ResolutionStage::GraphLabel => self.graph_label = score,
            ResolutionStage::VectorSimilarity => self.embedding = score,
        }
    }

    /// Returns the score of a stage.
    #[must_use]
    pub const fn get(&self, stage: ResolutionStage) -> f32 {
        match stage {
            ResolutionStage::CanonicalRule => self.pattern,
            ResolutionStage::AliasTable => self.alias,
            ResolutionStage::GraphLabel => self.graph_label,
            ResolutionStage::VectorSimilarity => self.embedding,
        }
    }
}

/// Weighted four-component confidence of one resolution.
///
/// # Examples
///
/// ```
/// use fleetql::{ConfidenceScore, ResolutionStage, ResolutionWeights, StageScores};
///
/// let mut scores = StageScores::default();
/// scores.record(ResolutionStage::CanonicalRule, 1.0);
/// scores.record(ResolutionStage::AliasTable, 1.0);
/// let conf = ConfidenceScore::weigh(scores, &ResolutionWeights::default());
/// assert!((conf.total() - 0.70).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Per-stage scores.
    pub breakdown: StageScores,

    /// Weighted sum of the breakdown.
    total: f32,
}

impl ConfidenceScore {
    /// Zero confidence (nothing resolved).
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Computes the weighted total of a breakdown.
    #[must_use]
    pub fn weigh(breakdown: StageScores, weights: &ResolutionWeights) -> Self {
        let total = ResolutionStage::ORDER
            .iter()
            .map(|&stage| breakdown.get(stage) * weights.for_stage(stage))
            .sum::<f32>()
            .clamp(0.0, 1.0);
        Self { breakdown, total }
    }

    /// The weighted total in [0, 1].
    #[must_use]
    pub const fn total(&self) -> f32 {
        self.total
    }

    /// "Confident" means total ≥ `confident_total` OR pattern ≥ `confident_pattern`.
    #[must_use]
    pub fn is_confident(&self, thresholds: &ConfidenceThresholds) -> bool {
        self.total >= thresholds.confident_total
            || self.breakdown.pattern >= thresholds.confident_pattern
    }
}

impl fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} (pattern {:.2}, alias {:.2}, graph {:.2}, vector {:.2})",
            self.total,
            self.breakdown.pattern,
            self.breakdown.alias,
            self.breakdown.graph_label,
            self.breakdown.embedding
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pattern: f32, alias: f32, graph: f32, vector: f32) -> StageScores {
        let mut s = StageScores::default();
        s.record(ResolutionStage::CanonicalRule, pattern);
        s.record(ResolutionStage::AliasTable, alias);
        s.record(ResolutionStage::GraphLabel, graph);
        s.record(ResolutionStage::VectorSimilarity, vector);
        s
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!(ResolutionWeights::default().validate().is_ok());
    }

    #[test]
    fn test_weights_reject_bad_sum() {
        let w = ResolutionWeights {
            pattern: 0.5,
            alias: 0.5,
            graph_label: 0.5,
            embedding: 0.0,
        };
        assert!(matches!(w.validate(), Err(ValidationError::WeightsDoNotSum { .. })));
    }

    #[test]
    fn test_weights_reject_out_of_range() {
        let w = ResolutionWeights {
            pattern: 1.2,
            alias: -0.2,
            graph_label: 0.0,
            embedding: 0.0,
        };
        assert!(matches!(w.validate(), Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn test_weighted_total() {
        let conf = ConfidenceScore::weigh(scores(1.0, 1.0, 0.0, 0.0), &ResolutionWeights::default());
        assert!((conf.total() - 0.7).abs() < 1e-6);

        let conf = ConfidenceScore::weigh(scores(0.0, 0.0, 0.0, 0.9), &ResolutionWeights::default());
        assert!((conf.total() - 0.09).abs() < 1e-6);
    }

    #[test]
    fn test_confident_by_total_or_pattern() {
        let t = ConfidenceThresholds::default();

        let by_pattern = ConfidenceScore::weigh(scores(0.85, 0.0, 0.0, 0.0), &ResolutionWeights::default());
        assert!(by_pattern.total() < 0.6);
        assert!(by_pattern.is_confident(&t));

        let by_total = ConfidenceScore::weigh(scores(0.7, 1.0, 0.9, 0.0), &ResolutionWeights::default());
        assert!(by_total.is_confident(&t));

        let neither = ConfidenceScore::weigh(scores(0.0, 0.0, 0.9, 0.9), &ResolutionWeights::default());
        assert!(!neither.is_confident(&t));
    }

    #[test]
    fn test_zero_is_not_confident() {
        assert!(!ConfidenceScore::zero().is_confident(&ConfidenceThresholds::default()));
        assert_eq!(ConfidenceScore::zero().total(), 0.0);
    }

    #[test]
    fn test_record_clamps_and_ignores_nan() {
        let mut s = StageScores::default();
        s.record(ResolutionStage::GraphLabel, 3.0);
        s.record(ResolutionStage::VectorSimilarity, f32::NAN);
        assert_eq!(s.graph_label, 1.0);
        assert_eq!(s.embedding, 0.0);
    }

    #[test]
    fn test_threshold_order_validated() {
        let t = ConfidenceThresholds {
            gate_high: 0.5,
            gate_mid: 0.7,
            ..ConfidenceThresholds::default()
        };
        assert!(matches!(t.validate(), Err(ValidationError::ThresholdOrder { .. })));
    }

    #[test]
    fn test_display_mentions_components() {
        let conf = ConfidenceScore::weigh(scores(1.0, 1.0, 0.0, 0.0), &ResolutionWeights::default());
        let s = format!("{conf}");
        assert!(s.contains("0.70"));
        assert!(s.contains("alias 1.00"));
    }
}
