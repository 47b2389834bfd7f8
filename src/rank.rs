//! Result aggregation and ranking.
//!
//! Graph evidence, structured records and retrieved documents are merged into
//! one list of [`ResultItem`]s and scored with
//! `text × w_text + entity_match × w_entity + connectivity × w_graph + recency × w_recency`.
//! Ties fall back to the intent's fixed item-type priority, then title, then id,
//! so ordering is total and deterministic. Ranking never looks at the caller's role.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::{validate_unit, ConfidenceThresholds};
use crate::embedding::{content_tokens, cosine_similarity, lexical_embedding};
use crate::entity::{CanonicalId, EntityKind};
use crate::error::ValidationError;
use crate::graph::{EdgeType, EvidenceSet, Provenance};
use crate::intent::Intent;
use crate::resolve::ResolvedEntity;
use crate::storage::{DocumentHit, RecordKind, StructuredRecord};

/// Decay of entity-match score per traversal hop.
const HOP_DECAY: f32 = 0.85;
/// Graph degree at which an entity card's connectivity saturates.
const DEGREE_SATURATION: f32 = 5.0;
/// Connectivity of records and documents linked to a resolved entity.
const LINKED_CONNECTIVITY: f32 = 0.5;
/// Recency half-life in days.
const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

/// Type of a result item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Equipment card.
    Equipment,
    /// Part card.
    Part,
    /// Symptom card.
    Symptom,
    /// Person card.
    Person,
    /// Fault code card.
    FaultCode,
    /// Manual, procedure, drawing.
    Document,
    /// Maintenance interval.
    Maintenance,
    /// Past event.
    History,
    /// Work order.
    WorkOrder,
}

impl ItemType {
    /// Every item type.
    pub const ALL: [Self; 9] = [
        Self::Equipment,
        Self::Part,
        Self::Symptom,
        Self::Person,
        Self::FaultCode,
        Self::Document,
        Self::Maintenance,
        Self::History,
        Self::WorkOrder,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equipment => "equipment",
            Self::Part => "part",
            Self::Symptom => "symptom",
            Self::Person => "person",
            Self::FaultCode => "fault_code",
            Self::Document => "document",
            Self::Maintenance => "maintenance",
            Self::History => "history",
            Self::WorkOrder => "work_order",
        }
    }
}

impl From<EntityKind> for ItemType {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Equipment => Self::Equipment,
            EntityKind::Part => Self::Part,
            EntityKind::Symptom => Self::Symptom,
            EntityKind::Person => Self::Person,
            EntityKind::FaultCode => Self::FaultCode,
            EntityKind::Document => Self::Document,
        }
    }
}

impl From<RecordKind> for ItemType {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Maintenance => Self::Maintenance,
            RecordKind::History => Self::History,
            RecordKind::WorkOrder => Self::WorkOrder,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranking weights. Defaults: text 0.30, entity match 0.35, graph 0.20, recency 0.15.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankWeights {
    /// Lexical + semantic similarity to the query.
    pub text: f32,
    /// Match against a resolved entity.
    pub entity_match: f32,
    /// Graph connectivity.
    pub graph_connectivity: f32,
    /// Recency (history-oriented intents only).
    pub recency: f32,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            text: 0.30,
            entity_match: 0.35,
            graph_connectivity: 0.20,
            recency: 0.15,
        }
    }
}

impl RankWeights {
    /// Each weight in [0, 1] and the sum equal to 1 (±0.001).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` on an out-of-range weight or a bad sum.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_unit("rank_weights.text", self.text)?;
        validate_unit("rank_weights.entity_match", self.entity_match)?;
        validate_unit("rank_weights.graph_connectivity", self.graph_connectivity)?;
        validate_unit("rank_weights.recency", self.recency)?;
        let sum = self.text + self.entity_match + self.graph_connectivity + self.recency;
        if (sum - 1.0).abs() > 1e-3 {
            return Err(ValidationError::WeightsDoNotSum {
                group: "rank_weights".to_string(),
                sum: f64::from(sum),
            });
        }
        Ok(())
    }
}

/// Per-source scores of one item, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemScores {
    /// Text similarity.
    pub text: f32,
    /// Entity match.
    pub entity_match: f32,
    /// Graph connectivity.
    pub graph_connectivity: f32,
    /// Recency.
    pub recency: f32,
}

impl ItemScores {
    fn total(&self, w: &RankWeights) -> f32 {
        (self.text * w.text
            + self.entity_match * w.entity_match
            + self.graph_connectivity * w.graph_connectivity
            + self.recency * w.recency)
            .clamp(0.0, 1.0)
    }
}

/// What supports a result item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceRef {
    /// A graph node.
    Node {
        /// Node id.
        id: CanonicalId,
    },
    /// A graph edge with its provenance.
    Edge {
        /// Source node.
        from: CanonicalId,
        /// Target node.
        to: CanonicalId,
        /// Relationship.
        edge_type: EdgeType,
        /// Source document/chunk.
        #[serde(skip_serializing_if = "Option::is_none")]
        provenance: Option<Provenance>,
    },
    /// A structured record.
    Record {
        /// Record id.
        id: String,
        /// Source document/chunk.
        #[serde(skip_serializing_if = "Option::is_none")]
        provenance: Option<Provenance>,
    },
    /// A retrieved document.
    Document {
        /// Document id.
        id: String,
        /// Source chunk.
        #[serde(skip_serializing_if = "Option::is_none")]
        provenance: Option<Provenance>,
    },
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Source id (node, record or document id).
    pub id: String,
    /// Type.
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// Display title.
    pub title: String,
    /// Resolved entity the item belongs to. Drives the action gate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<CanonicalId>,
    /// Supporting evidence.
    pub evidence_refs: Vec<EvidenceRef>,
    /// Per-source scores.
    pub scores: ItemScores,
    /// Weighted total.
    pub total: f32,
    /// Event time, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Hours until due (maintenance items).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_in_hours: Option<f64>,
}

/// Everything the ranker merges for one query.
#[derive(Debug, Clone, Copy)]
pub struct RankInput<'a> {
    /// Politeness-normalized query text.
    pub query_text: &'a str,
    /// Classified intent.
    pub intent: Intent,
    /// Resolved entities, resolved or not.
    pub entities: &'a [ResolvedEntity],
    /// Graph traversal output.
    pub evidence: &'a EvidenceSet,
    /// Structured records of the resolved entities.
    pub records: &'a [StructuredRecord],
    /// Documents retrieved by text.
    pub documents: &'a [DocumentHit],
    /// Reference time for recency.
    pub now: DateTime<Utc>,
}

/// Lexical overlap and lexical-embedding cosine, averaged.
#[must_use]
pub fn text_score(query: &str, text: &str) -> f32 {
    let q: Vec<String> = content_tokens(query).collect();
    if q.is_empty() {
        return 0.0;
    }
    let t: Vec<String> = content_tokens(text).collect();
    #[allow(clippy::cast_precision_loss)]
    let overlap = q.iter().filter(|tok| t.contains(tok)).count() as f32 / q.len() as f32;
    let semantic = cosine_similarity(&lexical_embedding(query), &lexical_embedding(text)).clamp(0.0, 1.0);
    (0.5 * overlap + 0.5 * semantic).clamp(0.0, 1.0)
}

/// Exponential recency with a 30-day half-life; future timestamps score 1.
#[must_use]
pub fn recency_score(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let age_days = ((now - timestamp).num_seconds().max(0) as f64) / 86_400.0;
    #[allow(clippy::cast_possible_truncation)]
    let score = 0.5f64.powf(age_days / RECENCY_HALF_LIFE_DAYS) as f32;
    score
}

/// Merges and orders result items.
#[derive(Debug, Clone)]
pub struct Ranker {
    weights: RankWeights,
    thresholds: ConfidenceThresholds,
    max_results: usize,
}

impl Ranker {
    /// Creates a ranker.
    #[must_use]
    pub const fn new(weights: RankWeights, thresholds: ConfidenceThresholds, max_results: usize) -> Self {
        Self {
            weights,
            thresholds,
            max_results,
        }
    }

    fn entity_match(&self, entity: Option<&ResolvedEntity>, depth: u8) -> f32 {
        let Some(entity) = entity.filter(|e| e.is_resolved()) else {
            return 0.0;
        };
        let base = if entity.confidence.is_confident(&self.thresholds) {
            1.0
        } else {
            entity.confidence.total()
        };
        base * HOP_DECAY.powi(i32::from(depth))
    }

    /// Builds, scores, orders and truncates the result list.
    #[must_use]
    pub fn rank(&self, input: &RankInput<'_>) -> Vec<ResultItem> {
        let by_id: HashMap<&CanonicalId, &ResolvedEntity> = input
            .entities
            .iter()
            .filter_map(|e| e.canonical_id.as_ref().map(|id| (id, e)))
            .collect();
        let history = input.intent.is_history_oriented();
        let recency = |ts: Option<DateTime<Utc>>| match ts {
            Some(ts) if history => recency_score(ts, input.now),
            _ => 0.0,
        };

        let mut items: BTreeMap<(ItemType, String), ResultItem> = BTreeMap::new();
        let mut push = |item: ResultItem| {
            let key = (item.item_type, item.id.clone());
            match items.get(&key) {
                Some(existing) if existing.total >= item.total => {}
                _ => {
                    items.insert(key, item);
                }
            }
        };

        for entity in input.entities {
            let Some(id) = &entity.canonical_id else {
                continue;
            };
            let node = input.evidence.anchors.get(id);
            let title = node.map_or_else(|| entity.mention.text.clone(), |n| n.label.clone());
            let item_type = ItemType::from(node.map_or(entity.mention.kind, |n| n.kind));
            #[allow(clippy::cast_precision_loss)]
            let degree = input.evidence.degree_of(id) as f32;
            let scores = ItemScores {
                text: text_score(input.query_text, &format!("{title} {}", entity.mention.text)),
                entity_match: self.entity_match(Some(entity), 0),
                graph_connectivity: (degree / DEGREE_SATURATION).min(1.0),
                recency: 0.0,
            };
            push(ResultItem {
                id: id.to_string(),
                item_type,
                title,
                anchor: Some(id.clone()),
                evidence_refs: vec![EvidenceRef::Node { id: id.clone() }],
                total: scores.total(&self.weights),
                scores,
                timestamp: None,
                due_in_hours: None,
            });
        }

        for ev in &input.evidence.items {
            if by_id.contains_key(&ev.node.id) {
                continue;
            }
            let scores = ItemScores {
                text: text_score(input.query_text, &ev.node.label),
                entity_match: self.entity_match(by_id.get(&ev.anchor).copied(), ev.depth),
                graph_connectivity: ev.edge.confidence / f32::from(ev.depth.max(1)),
                recency: 0.0,
            };
            push(ResultItem {
                id: ev.node.id.to_string(),
                item_type: ev.node.kind.into(),
                title: ev.node.label.clone(),
                anchor: Some(ev.anchor.clone()),
                evidence_refs: vec![
                    EvidenceRef::Node { id: ev.node.id.clone() },
                    EvidenceRef::Edge {
                        from: ev.edge.from.clone(),
                        to: ev.edge.to.clone(),
                        edge_type: ev.edge.edge_type.clone(),
                        provenance: ev.edge.provenance.clone(),
                    },
                ],
                total: scores.total(&self.weights),
                scores,
                timestamp: None,
                due_in_hours: None,
            });
        }

        for record in input.records {
            let owner = by_id.get(&record.entity_id).copied();
            let scores = ItemScores {
                text: text_score(input.query_text, &record.title),
                entity_match: self.entity_match(owner, 0),
                graph_connectivity: if owner.is_some() { LINKED_CONNECTIVITY } else { 0.0 },
                recency: recency(record.timestamp),
            };
            push(ResultItem {
                id: record.id.clone(),
                item_type: record.kind.into(),
                title: record.title.clone(),
                anchor: owner.map(|_| record.entity_id.clone()),
                evidence_refs: vec![EvidenceRef::Record {
                    id: record.id.clone(),
                    provenance: record.provenance.clone(),
                }],
                total: scores.total(&self.weights),
                scores,
                timestamp: record.timestamp,
                due_in_hours: record.due_in_hours,
            });
        }

        for doc in input.documents {
            let owner = doc.entity_ids.iter().find_map(|id| by_id.get(id).copied());
            let scores = ItemScores {
                text: text_score(input.query_text, &format!("{} {}", doc.title, doc.excerpt)),
                entity_match: self.entity_match(owner, 0),
                graph_connectivity: if owner.is_some() { LINKED_CONNECTIVITY } else { 0.0 },
                recency: recency(doc.timestamp),
            };
            push(ResultItem {
                id: doc.id.clone(),
                item_type: ItemType::Document,
                title: doc.title.clone(),
                anchor: owner.and_then(|e| e.canonical_id.clone()),
                evidence_refs: vec![EvidenceRef::Document {
                    id: doc.id.clone(),
                    provenance: doc.provenance.clone(),
                }],
                total: scores.total(&self.weights),
                scores,
                timestamp: doc.timestamp,
                due_in_hours: None,
            });
        }

        let mut ranked: Vec<ResultItem> = items.into_values().collect();
        ranked.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| input.intent.priority_of(a.item_type).cmp(&input.intent.priority_of(b.item_type)))
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(self.max_results);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::{ConfidenceScore, ResolutionStage, ResolutionWeights, StageScores};
    use crate::entity::{EntityMention, TextSpan};
    use crate::graph::{GraphEdge, GraphEvidence, GraphNode, TraversalKind};
    use chrono::Duration;

    fn resolved(text: &str, id: &str, pattern: f32, alias: f32) -> ResolvedEntity {
        let mut s = StageScores::default();
        s.record(ResolutionStage::CanonicalRule, pattern);
        s.record(ResolutionStage::AliasTable, alias);
        ResolvedEntity {
            mention: EntityMention::pattern(text, EntityKind::Equipment, TextSpan { start: 0, end: text.len() }),
            canonical_id: Some(CanonicalId::new(id)),
            canonical_token: None,
            confidence: ConfidenceScore::weigh(s, &ResolutionWeights::default()),
            resolved_by: Some(ResolutionStage::AliasTable),
        }
    }

    fn record(id: &str, kind: RecordKind, title: &str, ts: Option<DateTime<Utc>>) -> StructuredRecord {
        StructuredRecord {
            id: id.to_string(),
            kind,
            entity_id: CanonicalId::new("GEN_1"),
            title: title.to_string(),
            timestamp: ts,
            due_in_hours: None,
            provenance: None,
        }
    }

    fn ranker() -> Ranker {
        Ranker::new(RankWeights::default(), ConfidenceThresholds::default(), 20)
    }

    #[test]
    fn default_rank_weights_are_valid() {
        RankWeights::default().validate().unwrap();
        let bad = RankWeights {
            text: 0.5,
            ..RankWeights::default()
        };
        assert!(matches!(bad.validate(), Err(ValidationError::WeightsDoNotSum { .. })));
    }

    #[test]
    fn text_score_prefers_overlap() {
        let q = "generator oil change due";
        assert!(text_score(q, "Generator 500h oil change") > text_score(q, "Watermaker membrane"));
        assert_eq!(text_score("", "anything"), 0.0);
    }

    #[test]
    fn recency_halves_every_thirty_days() {
        let now = Utc::now();
        assert!((recency_score(now, now) - 1.0).abs() < 1e-6);
        assert!((recency_score(now - Duration::days(30), now) - 0.5).abs() < 1e-3);
        assert!((recency_score(now + Duration::days(3), now) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn entity_match_decays_with_depth_and_confidence() {
        let confident = resolved("generator", "GEN_1", 1.0, 1.0);
        let weak = resolved("generator", "GEN_1", 0.0, 0.9);
        let r = ranker();
        assert_eq!(r.entity_match(Some(&confident), 0), 1.0);
        assert!((r.entity_match(Some(&confident), 2) - 0.7225).abs() < 1e-4);
        assert!((r.entity_match(Some(&weak), 0) - 0.27).abs() < 1e-4);
        assert_eq!(r.entity_match(None, 0), 0.0);
    }

    #[test]
    fn recency_applies_only_to_history_intents() {
        let now = Utc::now();
        let entities = vec![resolved("generator", "GEN_1", 1.0, 1.0)];
        let records = vec![
            record("h-old", RecordKind::History, "Generator overheating", Some(now - Duration::days(300))),
            record("h-new", RecordKind::History, "Generator overheating", Some(now - Duration::days(1))),
        ];
        let evidence = EvidenceSet::default();
        let mut input = RankInput {
            query_text: "generator overheating history",
            intent: Intent::History,
            entities: &entities,
            evidence: &evidence,
            records: &records,
            documents: &[],
            now,
        };

        let ranked = ranker().rank(&input);
        let pos = |id: &str| ranked.iter().position(|i| i.id == id).unwrap();
        assert!(pos("h-new") < pos("h-old"));

        input.intent = Intent::Maintenance;
        let ranked = ranker().rank(&input);
        assert!(ranked.iter().all(|i| i.scores.recency == 0.0));
        // Equal totals fall back to title, then id.
        let old = ranked.iter().position(|i| i.id == "h-old").unwrap();
        let new = ranked.iter().position(|i| i.id == "h-new").unwrap();
        assert_eq!(ranked[old].total, ranked[new].total);
        assert_eq!(new + 1, old);
    }

    #[test]
    fn unresolved_entities_produce_no_cards() {
        let mut e = resolved("watermaker", "WM_1", 1.0, 0.0);
        e.canonical_id = None;
        let evidence = EvidenceSet::default();
        let entities = vec![e];
        let ranked = ranker().rank(&RankInput {
            query_text: "watermaker",
            intent: Intent::General,
            entities: &entities,
            evidence: &evidence,
            records: &[],
            documents: &[],
            now: Utc::now(),
        });
        assert!(ranked.is_empty());
    }

    #[test]
    fn graph_evidence_becomes_items_with_edge_refs() {
        let entities = vec![resolved("generator", "GEN_1", 1.0, 1.0)];
        let mut evidence = EvidenceSet::default();
        evidence.anchors.insert(
            CanonicalId::new("GEN_1"),
            GraphNode::new("GEN_1", EntityKind::Equipment, "Port Generator"),
        );
        evidence.items.push(GraphEvidence {
            anchor: CanonicalId::new("GEN_1"),
            node: GraphNode::new("OF_1", EntityKind::Part, "Oil Filter"),
            edge: GraphEdge::new("GEN_1", EdgeType::UsesPart, "OF_1")
                .with_provenance(Provenance::document("manual-gen")),
            kind: TraversalKind::Direct,
            depth: 1,
        });
        let ranked = ranker().rank(&RankInput {
            query_text: "generator oil filter",
            intent: Intent::Parts,
            entities: &entities,
            evidence: &evidence,
            records: &[],
            documents: &[],
            now: Utc::now(),
        });

        assert_eq!(ranked.len(), 2);
        let part = ranked.iter().find(|i| i.item_type == ItemType::Part).unwrap();
        assert_eq!(part.anchor, Some(CanonicalId::new("GEN_1")));
        assert!(part
            .evidence_refs
            .iter()
            .any(|r| matches!(r, EvidenceRef::Edge { provenance: Some(p), .. } if p.document_id == "manual-gen")));
        let card = ranked.iter().find(|i| i.item_type == ItemType::Equipment).unwrap();
        assert_eq!(card.title, "Port Generator");
        assert!((card.scores.graph_connectivity - 0.2).abs() < 1e-6);
    }

    #[test]
    fn truncates_to_max_results() {
        let entities = vec![resolved("generator", "GEN_1", 1.0, 1.0)];
        let records: Vec<_> = (0..30)
            .map(|i| record(&format!("w{i:02}"), RecordKind::WorkOrder, "Generator work order", None))
            .collect();
        let evidence = EvidenceSet::default();
        let ranked = Ranker::new(RankWeights::default(), ConfidenceThresholds::default(), 5).rank(&RankInput {
            query_text: "generator",
            intent: Intent::General,
            entities: &entities,
            evidence: &evidence,
            records: &records,
            documents: &[],
            now: Utc::now(),
        });
        assert_eq!(ranked.len(), 5);
    }
}
