//! Collaborator traits for FleetQL.
//!
//! Every external system the engine reads from is consumed through one of
//! these traits. Lookups that are expected to be local and fast are plain
//! `Send + Sync` traits; the two capabilities that may block on a remote
//! service (model extraction, vector similarity) are async so the engine can
//! put a timeout around them.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{CanonicalId, EntityKind};
use crate::error::CollaboratorError;
use crate::graph::{Direction, EdgeType, GraphEdge, GraphNode, Provenance};
use crate::query::{Role, TenantId};

/// Tenant-scoped alias table.
pub trait AliasResolver: Send + Sync {
    /// Resolves a canonical token or raw mention text to a stored id.
    fn resolve(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        token: &str,
    ) -> Result<Option<CanonicalId>, CollaboratorError>;
}

/// Read-only view of the tenant graph.
pub trait GraphReader: Send + Sync {
    /// Nodes of `kind` whose label contains or resembles `text`.
    fn nodes_by_label(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        text: &str,
    ) -> Result<Vec<GraphNode>, CollaboratorError>;

    /// A single node by id.
    fn node(&self, tenant: &TenantId, id: &CanonicalId) -> Result<Option<GraphNode>, CollaboratorError>;

    /// Edges of `edge_type` leaving (`Outgoing`) or entering (`Incoming`) `from`.
    fn edges(
        &self,
        tenant: &TenantId,
        from: &CanonicalId,
        edge_type: &EdgeType,
        direction: Direction,
    ) -> Result<Vec<GraphEdge>, CollaboratorError>;
}

/// Tenant-scoped nearest-neighbour index over entity embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` ids with their similarity in [0, 1], best first.
    async fn nearest(
        &self,
        tenant: &TenantId,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(CanonicalId, f32)>, CollaboratorError>;
}

/// A mention returned by the external extraction capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMention {
    /// Declared type.
    pub kind: EntityKind,
    /// Mention text.
    pub text: String,
    /// Extractor confidence in [0, 1].
    pub confidence: f32,
}

/// Optional language-model extraction. Assumed side-effect free.
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    /// Extracts mentions from `text`.
    async fn extract(&self, text: &str, tenant: &TenantId) -> Result<Vec<ExtractedMention>, CollaboratorError>;
}

/// Authorization collaborator.
pub trait RolePolicyStore: Send + Sync {
    /// Whether `role` may perform `action_id`. Unknown pairs are denied.
    fn allowed(&self, role: &Role, action_id: &str) -> bool;
}

/// Structured record families fetched per resolved entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Maintenance interval with a due time.
    Maintenance,
    /// Past event (fault, repair, inspection).
    History,
    /// Open or closed work order.
    WorkOrder,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maintenance => write!(f, "maintenance"),
            Self::History => write!(f, "history"),
            Self::WorkOrder => write!(f, "work_order"),
        }
    }
}

/// A structured record attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    /// Record id.
    pub id: String,
    /// Family.
    pub kind: RecordKind,
    /// Owning entity.
    pub entity_id: CanonicalId,
    /// Display title.
    pub title: String,
    /// Event or last-update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Hours until due (maintenance records; negative means overdue).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_in_hours: Option<f64>,
    /// Source reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

/// A document retrieved by text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHit {
    /// Document id.
    pub id: String,
    /// Title.
    pub title: String,
    /// Matching excerpt, used for text scoring.
    #[serde(default)]
    pub excerpt: String,
    /// Entities the document is about.
    #[serde(default)]
    pub entity_ids: Vec<CanonicalId>,
    /// Last revision time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Chunk-level reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

/// Document and structured-record retrieval.
pub trait RecordSource: Send + Sync {
    /// Documents matching `text`, at most `limit`.
    fn documents(&self, tenant: &TenantId, text: &str, limit: usize) -> Result<Vec<DocumentHit>, CollaboratorError>;

    /// Records of `kind` attached to `entity`.
    fn records(
        &self,
        tenant: &TenantId,
        entity: &CanonicalId,
        kind: RecordKind,
    ) -> Result<Vec<StructuredRecord>, CollaboratorError>;
}
