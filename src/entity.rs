//! Entity identifiers and raw mentions.
//!
//! A mention is a span of query text believed to reference a domain entity.
//! It lives for one request only; resolution turns it into a
//! [`ResolvedEntity`](crate::resolve::ResolvedEntity) that may or may not
//! carry a canonical id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a real-world entity in the external graph/relational store.
///
/// # Examples
///
/// ```
/// use fleetql::CanonicalId;
///
/// let id = CanonicalId::new("GEN_1");
/// assert_eq!(id.as_str(), "GEN_1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
    /// Creates a canonical ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CanonicalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CanonicalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Declared type of a mention (and of graph nodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A machine or system aboard (main engine, generator, watermaker).
    Equipment,
    /// A consumable or spare part.
    Part,
    /// An observed symptom (overheating, vibration).
    Symptom,
    /// A crew position or person.
    Person,
    /// A manufacturer alarm/fault code.
    FaultCode,
    /// A manual, procedure, or drawing.
    Document,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Equipment,
        Self::Part,
        Self::Symptom,
        Self::Person,
        Self::FaultCode,
        Self::Document,
    ];

    /// Snake-case name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equipment => "equipment",
            Self::Part => "part",
            Self::Symptom => "symptom",
            Self::Person => "person",
            Self::FaultCode => "fault_code",
            Self::Document => "document",
        }
    }

    /// Parses the wire name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which extractor produced a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionSource {
    /// Dictionary or regex rule.
    Pattern,
    /// External language-model extraction.
    Model,
}

/// Byte offsets of a mention inside the query text (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

impl TextSpan {
    /// Returns true if the two spans share at least one byte.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A raw, unresolved reference to a domain entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    /// The mention text as it appeared in the query.
    pub text: String,

    /// Declared type.
    pub kind: EntityKind,

    /// Producing extractor.
    pub source: MentionSource,

    /// Position in the query text, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<TextSpan>,

    /// Confidence reported by the model extractor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extractor_confidence: Option<f32>,
}

impl EntityMention {
    /// Creates a pattern-sourced mention.
    #[must_use]
    pub fn pattern(text: impl Into<String>, kind: EntityKind, span: TextSpan) -> Self {
        Self {
            text: text.into(),
            kind,
            source: MentionSource::Pattern,
            span: Some(span),
            extractor_confidence: None,
        }
    }

    /// Creates a model-sourced mention.
    #[must_use]
    pub fn model(text: impl Into<String>, kind: EntityKind, confidence: f32) -> Self {
        Self {
            text: text.into(),
            kind,
            source: MentionSource::Model,
            span: None,
            extractor_confidence: Some(confidence.clamp(0.0, 1.0)),
        }
    }

    /// Lowercased, whitespace-collapsed text used for lookups.
    #[must_use]
    pub fn normalized_text(&self) -> String {
        normalize_phrase(&self.text)
    }
}

/// Lowercases and collapses whitespace.
#[must_use]
pub fn normalize_phrase(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_wire_names() {
        assert_eq!(EntityKind::parse("fault_code"), Some(EntityKind::FaultCode));
        assert_eq!(EntityKind::parse(" Equipment "), Some(EntityKind::Equipment));
        assert_eq!(EntityKind::parse("vessel"), None);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&EntityKind::FaultCode).unwrap();
        assert_eq!(json, "\"fault_code\"");
    }

    #[test]
    fn spans_overlap() {
        let a = TextSpan { start: 0, end: 5 };
        let b = TextSpan { start: 4, end: 8 };
        let c = TextSpan { start: 5, end: 8 };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn model_mention_clamps_confidence() {
        let m = EntityMention::model("Genset", EntityKind::Equipment, 1.4);
        assert_eq!(m.extractor_confidence, Some(1.0));
        assert_eq!(m.normalized_text(), "genset");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_phrase("  Main   Engine "), "main engine");
    }
}
