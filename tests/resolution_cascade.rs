mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{query, tenant};
use fleetql::graph::{Direction, EdgeType, GraphEdge, GraphNode};
use fleetql::storage::{AliasResolver, GraphReader, InMemoryRecordSource, VectorIndex};
use fleetql::{
    CanonicalId, CollaboratorError, EngineConfig, EntityKind, ResolutionStage, Role, SearchEngine, TenantId,
};

/// Alias table that knows only `generator`.
#[derive(Default)]
struct CountingAliases {
    calls: AtomicUsize,
}

impl AliasResolver for CountingAliases {
    fn resolve(&self, _tenant: &TenantId, _kind: EntityKind, token: &str) -> Result<Option<CanonicalId>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(token.eq_ignore_ascii_case("generator").then(|| CanonicalId::new("GEN_1")))
    }
}

/// Graph with a single `Watermaker` node; counts label lookups only.
#[derive(Default)]
struct CountingGraph {
    label_calls: AtomicUsize,
}

impl GraphReader for CountingGraph {
    fn nodes_by_label(&self, _tenant: &TenantId, kind: EntityKind, _text: &str) -> Result<Vec<GraphNode>, CollaboratorError> {
        self.label_calls.fetch_add(1, Ordering::SeqCst);
        if kind == EntityKind::Equipment {
            Ok(vec![GraphNode::new("WM_1", EntityKind::Equipment, "Watermaker")])
        } else {
            Ok(vec![])
        }
    }

    fn node(&self, _tenant: &TenantId, _id: &CanonicalId) -> Result<Option<GraphNode>, CollaboratorError> {
        Ok(None)
    }

    fn edges(
        &self,
        _tenant: &TenantId,
        _from: &CanonicalId,
        _edge_type: &EdgeType,
        _direction: Direction,
    ) -> Result<Vec<GraphEdge>, CollaboratorError> {
        Ok(vec![])
    }
}

/// Vector index that always answers with one weak neighbour.
#[derive(Default)]
struct CountingVectors {
    calls: AtomicUsize,
}

#[async_trait]
impl VectorIndex for CountingVectors {
    async fn nearest(
        &self,
        _tenant: &TenantId,
        _embedding: &[f32],
        _k: usize,
    ) -> Result<Vec<(CanonicalId, f32)>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![(CanonicalId::new("HVAC_1"), 0.2)])
    }
}

struct Harness {
    aliases: Arc<CountingAliases>,
    graph: Arc<CountingGraph>,
    vectors: Arc<CountingVectors>,
    engine: SearchEngine,
}

fn harness() -> Harness {
    let aliases = Arc::new(CountingAliases::default());
    let graph = Arc::new(CountingGraph::default());
    let vectors = Arc::new(CountingVectors::default());
    let engine = SearchEngine::builder()
        .config(EngineConfig::default())
        .aliases(aliases.clone())
        .graph(graph.clone())
        .records(Arc::new(InMemoryRecordSource::new()))
        .vectors(vectors.clone())
        .build()
        .unwrap();
    Harness {
        aliases,
        graph,
        vectors,
        engine,
    }
}

#[tokio::test]
async fn alias_hit_short_circuits_later_stages() {
    let h = harness();
    let frame = h
        .engine
        .search(&query("generator vibration", Role::Engineer))
        .await
        .unwrap();

    let generator = frame
        .resolved_entities
        .iter()
        .find(|e| e.mention.text == "generator")
        .unwrap();
    assert_eq!(generator.canonical_id, Some(CanonicalId::new("GEN_1")));
    assert_eq!(generator.resolved_by, Some(ResolutionStage::AliasTable));
    assert!(h.aliases.calls.load(Ordering::SeqCst) >= 1);

    // "vibration" misses the alias table, so only it reaches the later stages.
    let vibration = frame
        .resolved_entities
        .iter()
        .find(|e| e.mention.text == "vibration")
        .unwrap();
    assert!(!vibration.is_resolved());
    assert_eq!(h.vectors.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn single_alias_hit_never_touches_graph_or_vectors() {
    let h = harness();
    let frame = h.engine.search(&query("generator", Role::Engineer)).await.unwrap();
    assert_eq!(frame.resolved_entities.len(), 1);
    assert!(frame.resolved_entities[0].is_resolved());
    assert_eq!(h.graph.label_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.vectors.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn alias_miss_falls_through_to_graph_labels() {
    let h = harness();
    let frame = h
        .engine
        .search(&query("watermaker membrane", Role::Engineer))
        .await
        .unwrap();

    let watermaker = frame
        .resolved_entities
        .iter()
        .find(|e| e.mention.text == "watermaker")
        .unwrap();
    assert_eq!(watermaker.canonical_id, Some(CanonicalId::new("WM_1")));
    assert_eq!(watermaker.resolved_by, Some(ResolutionStage::GraphLabel));
    // Rule 1.0 × 0.4 + label 1.0 × 0.2.
    assert!((watermaker.confidence.total() - 0.6).abs() < 1e-5);
    assert!(h.graph.label_calls.load(Ordering::SeqCst) >= 1);

    // The part has no label match and no strong neighbour.
    let membrane = frame
        .resolved_entities
        .iter()
        .find(|e| e.mention.text == "membrane")
        .unwrap();
    assert!(!membrane.is_resolved());
    assert_eq!(membrane.confidence.total(), 0.0);
    assert_eq!(h.vectors.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unresolved_mentions_keep_text_order() {
    let h = harness();
    let frame = h
        .engine
        .search(&query("thermostat and gasket on the generator", Role::Engineer))
        .await
        .unwrap();
    let texts: Vec<&str> = frame.resolved_entities.iter().map(|e| e.mention.text.as_str()).collect();
    assert_eq!(texts, vec!["thermostat", "gasket", "generator"]);
    assert!(!frame.resolved_entities[0].is_resolved());
    assert!(!frame.resolved_entities[1].is_resolved());
    assert!(frame.resolved_entities[2].is_resolved());
    assert_eq!(frame.unresolved().count(), 2);
}

#[tokio::test]
async fn resolution_is_deterministic_across_runs() {
    let h = harness();
    let q = query("watermaker and generator overheating", Role::Engineer);
    let first = h.engine.search(&q).await.unwrap();
    for _ in 0..5 {
        let again = h.engine.search(&q).await.unwrap();
        assert_eq!(again.resolved_entities, first.resolved_entities);
    }
}

#[tokio::test]
async fn tenants_resolve_independently() {
    let stores = fleetql::storage::InMemoryStores::new();
    stores
        .aliases
        .insert(&tenant(), EntityKind::Equipment, "generator", "GEN_1")
        .unwrap();
    stores
        .aliases
        .insert(&TenantId::new("yacht-2"), EntityKind::Equipment, "generator", "DG_PORT")
        .unwrap();
    let engine = SearchEngine::in_memory(&stores, EngineConfig::default()).unwrap();

    let ours = engine.search(&query("generator", Role::Crew)).await.unwrap();
    let theirs = engine
        .search(&fleetql::Query::new(
            "generator",
            fleetql::UserId::new("u-2"),
            Role::Crew,
            TenantId::new("yacht-2"),
        ))
        .await
        .unwrap();
    assert_eq!(ours.resolved_entities[0].canonical_id, Some(CanonicalId::new("GEN_1")));
    assert_eq!(theirs.resolved_entities[0].canonical_id, Some(CanonicalId::new("DG_PORT")));
}
