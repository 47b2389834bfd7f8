//! In-memory collaborator backends.
//!
//! Thread-safe implementations of every collaborator trait, intended for
//! embedded usage, tests, the fixture CLI and as a reference for real
//! adapters. All lookups are tenant-scoped and return results in a
//! deterministic order.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{content_tokens, cosine_similarity, lexical_embedding};
use crate::entity::{CanonicalId, EntityKind};
use crate::error::CollaboratorError;
use crate::graph::{Direction, EdgeType, GraphEdge, GraphNode};
use crate::query::TenantId;
use crate::storage::traits::{
    AliasResolver, DocumentHit, GraphReader, RecordKind, RecordSource, StructuredRecord, VectorIndex,
};

fn lock_err(context: &'static str) -> CollaboratorError {
    CollaboratorError::Backend(format!("poisoned lock: {context}"))
}

/// Lowercase, trimmed, `_`/`-` folded to spaces, whitespace collapsed.
fn normalize_key(s: &str) -> String {
    s.trim()
        .to_ascii_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Minimum Jaro-Winkler similarity for a label to be returned as a candidate.
const LABEL_CANDIDATE_SIMILARITY: f64 = 0.75;

// ---------------------------------------------------------------------------
// Alias table
// ---------------------------------------------------------------------------

/// Tenant-scoped alias table keyed by (kind, normalized alias).
#[derive(Debug, Default)]
pub struct InMemoryAliasTable {
    state: RwLock<HashMap<(TenantId, EntityKind, String), CanonicalId>>,
}

impl InMemoryAliasTable {
    /// Creates an empty alias table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an alias.
    pub fn insert(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        alias: &str,
        id: impl Into<CanonicalId>,
    ) -> Result<(), CollaboratorError> {
        let key = normalize_key(alias);
        if key.is_empty() {
            return Err(CollaboratorError::Rejected("alias cannot be empty".to_string()));
        }
        let mut state = self.state.write().map_err(|_| lock_err("alias.insert"))?;
        state.insert((tenant.clone(), kind, key), id.into());
        Ok(())
    }
}

impl AliasResolver for InMemoryAliasTable {
    fn resolve(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        token: &str,
    ) -> Result<Option<CanonicalId>, CollaboratorError> {
        let key = normalize_key(token);
        if key.is_empty() {
            return Ok(None);
        }
        let state = self.state.read().map_err(|_| lock_err("alias.resolve"))?;
        Ok(state.get(&(tenant.clone(), kind, key)).cloned())
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct GraphState {
    nodes: BTreeMap<(TenantId, CanonicalId), GraphNode>,
    outgoing: HashMap<(TenantId, CanonicalId), Vec<GraphEdge>>,
    incoming: HashMap<(TenantId, CanonicalId), Vec<GraphEdge>>,
}

/// Adjacency-list graph per tenant.
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    state: RwLock<GraphState>,
}

impl InMemoryGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a node.
    pub fn insert_node(&self, tenant: &TenantId, node: GraphNode) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().map_err(|_| lock_err("graph.insert_node"))?;
        state.nodes.insert((tenant.clone(), node.id.clone()), node);
        Ok(())
    }

    /// Appends an edge. Endpoints need not exist yet.
    pub fn insert_edge(&self, tenant: &TenantId, edge: GraphEdge) -> Result<(), CollaboratorError> {
        if edge.from == edge.to {
            return Err(CollaboratorError::Rejected(format!("self-loop on {}", edge.from)));
        }
        let mut state = self.state.write().map_err(|_| lock_err("graph.insert_edge"))?;
        state
            .incoming
            .entry((tenant.clone(), edge.to.clone()))
            .or_default()
            .push(edge.clone());
        state
            .outgoing
            .entry((tenant.clone(), edge.from.clone()))
            .or_default()
            .push(edge);
        Ok(())
    }
}

fn label_matches(label: &str, needle: &str) -> bool {
    if label.contains(needle) || needle.contains(label) {
        return true;
    }
    if strsim::jaro_winkler(label, needle) >= LABEL_CANDIDATE_SIMILARITY {
        return true;
    }
    let words: Vec<&str> = label.split(' ').collect();
    needle.split(' ').any(|w| w.len() > 2 && words.contains(&w))
}

impl GraphReader for InMemoryGraph {
    fn nodes_by_label(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        text: &str,
    ) -> Result<Vec<GraphNode>, CollaboratorError> {
        let needle = normalize_key(text);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read().map_err(|_| lock_err("graph.nodes_by_label"))?;
        Ok(state
            .nodes
            .iter()
            .filter(|((t, _), node)| t == tenant && node.kind == kind)
            .filter(|(_, node)| label_matches(&normalize_key(&node.label), &needle))
            .map(|(_, node)| node.clone())
            .collect())
    }

    fn node(&self, tenant: &TenantId, id: &CanonicalId) -> Result<Option<GraphNode>, CollaboratorError> {
        let state = self.state.read().map_err(|_| lock_err("graph.node"))?;
        Ok(state.nodes.get(&(tenant.clone(), id.clone())).cloned())
    }

    fn edges(
        &self,
        tenant: &TenantId,
        from: &CanonicalId,
        edge_type: &EdgeType,
        direction: Direction,
    ) -> Result<Vec<GraphEdge>, CollaboratorError> {
        let state = self.state.read().map_err(|_| lock_err("graph.edges"))?;
        let index = match direction {
            Direction::Outgoing => &state.outgoing,
            Direction::Incoming => &state.incoming,
        };
        Ok(index
            .get(&(tenant.clone(), from.clone()))
            .map(|edges| edges.iter().filter(|e| &e.edge_type == edge_type).cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Vector index
// ---------------------------------------------------------------------------

/// Brute-force cosine index per tenant.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    state: RwLock<BTreeMap<(TenantId, CanonicalId), Vec<f32>>>,
}

impl InMemoryVectorIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an embedding. All embeddings of one tenant must share a dimension.
    pub fn insert(
        &self,
        tenant: &TenantId,
        id: impl Into<CanonicalId>,
        embedding: Vec<f32>,
    ) -> Result<(), CollaboratorError> {
        if embedding.is_empty() {
            return Err(CollaboratorError::Rejected("embedding cannot be empty".to_string()));
        }
        let mut state = self.state.write().map_err(|_| lock_err("vector.insert"))?;
        if let Some((_, existing)) = state.iter().find(|((t, _), _)| t == tenant) {
            if existing.len() != embedding.len() {
                return Err(CollaboratorError::Rejected(format!(
                    "embedding dimension mismatch: expected={} got={}",
                    existing.len(),
                    embedding.len()
                )));
            }
        }
        state.insert((tenant.clone(), id.into()), embedding);
        Ok(())
    }

    /// Stores the lexical embedding of `text`.
    pub fn insert_text(
        &self,
        tenant: &TenantId,
        id: impl Into<CanonicalId>,
        text: &str,
    ) -> Result<(), CollaboratorError> {
        self.insert(tenant, id, lexical_embedding(text))
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn nearest(
        &self,
        tenant: &TenantId,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(CanonicalId, f32)>, CollaboratorError> {
        if k == 0 || embedding.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read().map_err(|_| lock_err("vector.nearest"))?;

        let mut scored = Vec::new();
        for ((t, id), stored) in state.iter() {
            if t != tenant {
                continue;
            }
            if stored.len() != embedding.len() {
                return Err(CollaboratorError::Rejected(format!(
                    "embedding dimension mismatch: query={} stored={}",
                    embedding.len(),
                    stored.len()
                )));
            }
            let sim = cosine_similarity(embedding, stored).clamp(0.0, 1.0);
            if sim > 0.0 {
                scored.push((id.clone(), sim));
            }
        }

        scored.sort_by(|(ia, sa), (ib, sb)| sb.total_cmp(sa).then_with(|| ia.cmp(ib)));
        scored.truncate(k);
        Ok(scored)
    }
}

// ---------------------------------------------------------------------------
// Records and documents
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RecordState {
    records: HashMap<(TenantId, CanonicalId, RecordKind), Vec<StructuredRecord>>,
    documents: BTreeMap<(TenantId, String), DocumentHit>,
}

/// Structured records by entity and a token-overlap document search.
#[derive(Debug, Default)]
pub struct InMemoryRecordSource {
    state: RwLock<RecordState>,
}

impl InMemoryRecordSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a structured record.
    pub fn insert_record(&self, tenant: &TenantId, record: StructuredRecord) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().map_err(|_| lock_err("records.insert_record"))?;
        let bucket = state
            .records
            .entry((tenant.clone(), record.entity_id.clone(), record.kind))
            .or_default();
        if bucket.iter().any(|r| r.id == record.id) {
            return Err(CollaboratorError::Rejected(format!("duplicate record id: {}", record.id)));
        }
        bucket.push(record);
        Ok(())
    }

    /// Adds or replaces a document.
    pub fn insert_document(&self, tenant: &TenantId, document: DocumentHit) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().map_err(|_| lock_err("records.insert_document"))?;
        state.documents.insert((tenant.clone(), document.id.clone()), document);
        Ok(())
    }
}

impl RecordSource for InMemoryRecordSource {
    fn documents(&self, tenant: &TenantId, text: &str, limit: usize) -> Result<Vec<DocumentHit>, CollaboratorError> {
        let query: Vec<String> = content_tokens(text).collect();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read().map_err(|_| lock_err("records.documents"))?;

        let mut scored: Vec<(usize, &DocumentHit)> = state
            .documents
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .filter_map(|(_, doc)| {
                let haystack = format!("{} {}", doc.title, doc.excerpt);
                let tokens: Vec<String> = content_tokens(&haystack).collect();
                let overlap = query.iter().filter(|q| tokens.contains(q)).count();
                (overlap > 0).then_some((overlap, doc))
            })
            .collect();

        scored.sort_by(|(oa, da), (ob, db)| ob.cmp(oa).then_with(|| da.id.cmp(&db.id)));
        Ok(scored.into_iter().take(limit).map(|(_, d)| d.clone()).collect())
    }

    fn records(
        &self,
        tenant: &TenantId,
        entity: &CanonicalId,
        kind: RecordKind,
    ) -> Result<Vec<StructuredRecord>, CollaboratorError> {
        let state = self.state.read().map_err(|_| lock_err("records.records"))?;
        let mut out = state
            .records
            .get(&(tenant.clone(), entity.clone(), kind))
            .cloned()
            .unwrap_or_default();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// One alias row of a fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    /// Entity kind the alias applies to.
    pub kind: EntityKind,
    /// Alias text or canonical token.
    pub alias: String,
    /// Target id.
    pub id: CanonicalId,
}

/// One vector row of a fixture. `embedding` wins over `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Entity id.
    pub id: CanonicalId,
    /// Explicit embedding.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Text to embed lexically.
    #[serde(default)]
    pub text: Option<String>,
}

/// Collaborator data for one tenant, as loaded by the fixture CLI and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// Tenant the data belongs to.
    pub tenant: Option<TenantId>,
    /// Alias rows.
    pub aliases: Vec<AliasEntry>,
    /// Graph nodes.
    pub nodes: Vec<GraphNode>,
    /// Graph edges.
    pub edges: Vec<GraphEdge>,
    /// Vector rows.
    pub vectors: Vec<VectorEntry>,
    /// Structured records.
    pub records: Vec<StructuredRecord>,
    /// Documents.
    pub documents: Vec<DocumentHit>,
}

impl Fixture {
    /// Parses a JSON fixture.
    pub fn from_json(s: &str) -> Result<Self, CollaboratorError> {
        serde_json::from_str(s).map_err(|e| CollaboratorError::Rejected(format!("invalid fixture: {e}")))
    }
}

/// The full set of in-memory collaborators.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStores {
    /// Alias table.
    pub aliases: Arc<InMemoryAliasTable>,
    /// Graph.
    pub graph: Arc<InMemoryGraph>,
    /// Vector index.
    pub vectors: Arc<InMemoryVectorIndex>,
    /// Records and documents.
    pub records: Arc<InMemoryRecordSource>,
}

impl InMemoryStores {
    /// Creates empty stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a fixture; rows without a fixture tenant go to `default_tenant`.
    pub fn load(&self, fixture: &Fixture, default_tenant: &TenantId) -> Result<(), CollaboratorError> {
        let tenant = fixture.tenant.as_ref().unwrap_or(default_tenant);
        for a in &fixture.aliases {
            self.aliases.insert(tenant, a.kind, &a.alias, a.id.clone())?;
        }
        for n in &fixture.nodes {
            self.graph.insert_node(tenant, n.clone())?;
        }
        for e in &fixture.edges {
            self.graph.insert_edge(tenant, e.clone())?;
        }
        for v in &fixture.vectors {
            match (&v.embedding, &v.text) {
                (Some(embedding), _) => self.vectors.insert(tenant, v.id.clone(), embedding.clone())?,
                (None, Some(text)) => self.vectors.insert_text(tenant, v.id.clone(), text)?,
                (None, None) => {
                    return Err(CollaboratorError::Rejected(format!(
                        "vector row {} has neither embedding nor text",
                        v.id
                    )))
                }
            }
        }
        for r in &fixture.records {
            self.records.insert_record(tenant, r.clone())?;
        }
        for d in &fixture.documents {
            self.records.insert_document(tenant, d.clone())?;
        }
        Ok(())
    }
}
