//! Graph value types.
//!
//! Nodes and edges are owned by the external graph store; the engine only
//! reads them. Every edge can carry a provenance reference pointing back to
//! the document chunk that justified it, so answers can cite their source.

/// Fixed-depth relationship traversal.
pub mod traversal;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{CanonicalId, EntityKind};

pub use traversal::{EvidenceSet, GraphEvidence, TraversalEngine, TraversalKind, MAX_TRAVERSAL_DEPTH};

/// A node in the tenant graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphNode {
    /// Canonical id.
    pub id: CanonicalId,
    /// Node type.
    pub kind: EntityKind,
    /// Display label.
    pub label: String,
}

impl GraphNode {
    /// Creates a node.
    #[must_use]
    pub fn new(id: impl Into<CanonicalId>, kind: EntityKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
        }
    }
}

/// Typed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EdgeType {
    /// Equipment → part it consumes.
    UsesPart,
    /// Component → the assembly it belongs to.
    PartOf,
    /// Equipment → observed symptom.
    HasSymptom,
    /// Equipment → fault code it raises.
    HasFault,
    /// Any node → document describing it.
    DocumentedIn,
    /// Store-specific relationship.
    Custom(String),
}

impl EdgeType {
    /// Wire name ("uses-part", "part-of", ...).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::UsesPart => "uses-part",
            Self::PartOf => "part-of",
            Self::HasSymptom => "has-symptom",
            Self::HasFault => "has-fault",
            Self::DocumentedIn => "documented-in",
            Self::Custom(name) => name.as_str(),
        }
    }
}

impl TryFrom<String> for EdgeType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.is_empty() {
            return Err("edge type cannot be empty".to_string());
        }
        let normalized = value.to_ascii_lowercase().replace(['_', ' '], "-");
        Ok(match normalized.as_str() {
            "uses-part" => Self::UsesPart,
            "part-of" | "is-part-of" => Self::PartOf,
            "has-symptom" => Self::HasSymptom,
            "has-fault" => Self::HasFault,
            "documented-in" => Self::DocumentedIn,
            _ => Self::Custom(normalized),
        })
    }
}

impl From<EdgeType> for String {
    fn from(edge_type: EdgeType) -> Self {
        edge_type.as_str().to_string()
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge direction relative to the queried node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Edges originating at the node.
    Outgoing,
    /// Edges terminating at the node.
    Incoming,
}

/// Pointer back to the source document/record that justified a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Source document or record id.
    pub document_id: String,

    /// Chunk within the document, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

impl Provenance {
    /// Creates a document-level provenance reference.
    #[must_use]
    pub fn document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_id: None,
        }
    }

    /// Narrows the reference to a chunk.
    #[must_use]
    pub fn with_chunk(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.chunk_id {
            Some(chunk) => write!(f, "{}#{chunk}", self.document_id),
            None => f.write_str(&self.document_id),
        }
    }
}

/// A directed, typed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node.
    pub from: CanonicalId,
    /// Target node.
    pub to: CanonicalId,
    /// Relationship.
    pub edge_type: EdgeType,
    /// Store-assigned confidence in [0, 1].
    #[serde(default = "default_edge_confidence")]
    pub confidence: f32,
    /// Where the fact came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

fn default_edge_confidence() -> f32 {
    1.0
}

impl GraphEdge {
    /// Creates an edge with confidence 1.0 and no provenance.
    #[must_use]
    pub fn new(from: impl Into<CanonicalId>, edge_type: EdgeType, to: impl Into<CanonicalId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            edge_type,
            confidence: 1.0,
            provenance: None,
        }
    }

    /// Sets the confidence (clamped).
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Sets the provenance reference.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// The node on the far side when the edge was reached from `direction`.
    #[must_use]
    pub const fn far_end(&self, direction: Direction) -> &CanonicalId {
        match direction {
            Direction::Outgoing => &self.to,
            Direction::Incoming => &self.from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_type_parses_aliases() {
        assert_eq!(EdgeType::try_from("is_part_of".to_string()).unwrap(), EdgeType::PartOf);
        assert_eq!(EdgeType::try_from("Uses Part".to_string()).unwrap(), EdgeType::UsesPart);
        assert_eq!(
            EdgeType::try_from("replaced-by".to_string()).unwrap(),
            EdgeType::Custom("replaced-by".to_string())
        );
        assert!(EdgeType::try_from(String::new()).is_err());
    }

    #[test]
    fn edge_deserializes_with_defaults() {
        let edge: GraphEdge =
            serde_json::from_str(r#"{"from":"GEN_1","to":"OF_1","edge_type":"uses-part"}"#).unwrap();
        assert_eq!(edge.edge_type, EdgeType::UsesPart);
        assert_eq!(edge.confidence, 1.0);
        assert!(edge.provenance.is_none());
    }

    #[test]
    fn far_end_follows_direction() {
        let edge = GraphEdge::new("GEN_1", EdgeType::UsesPart, "OF_1");
        assert_eq!(edge.far_end(Direction::Outgoing).as_str(), "OF_1");
        assert_eq!(edge.far_end(Direction::Incoming).as_str(), "GEN_1");
    }

    #[test]
    fn provenance_display() {
        let p = Provenance::document("manual-cat-c18").with_chunk("p42");
        assert_eq!(p.to_string(), "manual-cat-c18#p42");
    }
}
