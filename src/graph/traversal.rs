use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entity::CanonicalId;
use crate::error::{Degradation, DegradedStage};
use crate::graph::{Direction, EdgeType, GraphEdge, GraphNode};
use crate::intent::PlanStep;
use crate::query::TenantId;
use crate::storage::GraphReader;

/// Maximum hop count of any traversal. Not configurable.
pub const MAX_TRAVERSAL_DEPTH: u8 = 2;

/// Maximum number of edges read per anchor per plan step.
pub const MAX_EDGES_PER_STEP: usize = 64;

/// Traversal pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalKind {
    /// Outgoing edges of the type, one hop.
    Direct,
    /// Incoming edges of the type, one hop: what depends on the anchor.
    ParentImpact,
    /// Outgoing `part-of` to the parent, then the parent's outgoing edges of the type.
    Cascading,
}

/// One node reached from an anchor entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEvidence {
    /// Resolved entity the traversal started from.
    pub anchor: CanonicalId,
    /// Reached node.
    pub node: GraphNode,
    /// Last edge followed; carries the provenance reference.
    pub edge: GraphEdge,
    /// Pattern that reached the node.
    pub kind: TraversalKind,
    /// Hop count from the anchor (1 or 2).
    pub depth: u8,
}

/// Everything one traversal produced.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSet {
    /// Evidence in anchor order, then plan order, then edge order.
    pub items: Vec<GraphEvidence>,
    /// Anchor nodes as stored, for rendering entity cards.
    pub anchors: BTreeMap<CanonicalId, GraphNode>,
    /// Graph calls that failed and were skipped.
    pub degradations: Vec<Degradation>,
}

impl EvidenceSet {
    /// Number of evidence items reached from `anchor`.
    #[must_use]
    pub fn degree_of(&self, anchor: &CanonicalId) -> usize {
        self.items.iter().filter(|e| &e.anchor == anchor).count()
    }

    /// Returns true if no evidence was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Executes fixed-depth traversal plans against a [`GraphReader`].
///
/// Graph failures never abort a traversal: the failing step is skipped and
/// recorded as a [`Degradation`].
#[derive(Clone)]
pub struct TraversalEngine {
    graph: Arc<dyn GraphReader>,
}

impl std::fmt::Debug for TraversalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraversalEngine").finish_non_exhaustive()
    }
}

struct AnchorWalk<'a> {
    tenant: &'a TenantId,
    anchor: &'a CanonicalId,
    seen: HashSet<CanonicalId>,
}

impl TraversalEngine {
    /// Creates a traversal engine.
    #[must_use]
    pub fn new(graph: Arc<dyn GraphReader>) -> Self {
        Self { graph }
    }

    /// Runs `plan` from every anchor. Anchors are visited in the given order;
    /// duplicates are visited once.
    pub fn traverse(&self, tenant: &TenantId, anchors: &[CanonicalId], plan: &[PlanStep]) -> EvidenceSet {
        let mut out = EvidenceSet::default();
        let mut visited_anchors = HashSet::new();

        for anchor in anchors {
            if !visited_anchors.insert(anchor.clone()) {
                continue;
            }

            match self.graph.node(tenant, anchor) {
                Ok(Some(node)) => {
                    out.anchors.insert(anchor.clone(), node);
                }
                Ok(None) => debug!(anchor = %anchor, "anchor not present in graph"),
                Err(e) => {
                    warn!(anchor = %anchor, error = %e, "graph node lookup failed");
                    out.degradations.push(Degradation::new(DegradedStage::Graph, e.to_string()));
                }
            }

            let mut walk = AnchorWalk {
                tenant,
                anchor,
                seen: HashSet::from([anchor.clone()]),
            };
            for step in plan {
                let result = match step.kind {
                    TraversalKind::Direct => self.one_hop(&mut walk, &step.edge_type, Direction::Outgoing, step.kind),
                    TraversalKind::ParentImpact => {
                        self.one_hop(&mut walk, &step.edge_type, Direction::Incoming, step.kind)
                    }
                    TraversalKind::Cascading => self.cascade(&mut walk, &step.edge_type),
                };
                match result {
                    Ok(mut items) => out.items.append(&mut items),
                    Err(e) => {
                        warn!(
                            anchor = %anchor,
                            edge_type = %step.edge_type,
                            error = %e,
                            "graph traversal step failed"
                        );
                        out.degradations.push(Degradation::new(DegradedStage::Graph, e.to_string()));
                    }
                }
            }
        }

        debug!(evidence = out.items.len(), anchors = out.anchors.len(), "graph traversal complete");
        out
    }

    fn sorted_edges(
        &self,
        tenant: &TenantId,
        from: &CanonicalId,
        edge_type: &EdgeType,
        direction: Direction,
    ) -> Result<Vec<GraphEdge>, crate::error::CollaboratorError> {
        let mut edges = self.graph.edges(tenant, from, edge_type, direction)?;
        edges.retain(|e| &e.edge_type == edge_type);
        edges.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.far_end(direction).cmp(b.far_end(direction)))
        });
        edges.truncate(MAX_EDGES_PER_STEP);
        Ok(edges)
    }

    fn one_hop(
        &self,
        walk: &mut AnchorWalk<'_>,
        edge_type: &EdgeType,
        direction: Direction,
        kind: TraversalKind,
    ) -> Result<Vec<GraphEvidence>, crate::error::CollaboratorError> {
        let edges = self.sorted_edges(walk.tenant, walk.anchor, edge_type, direction)?;
        self.collect(walk, edges, direction, kind, 1)
    }

    fn cascade(
        &self,
        walk: &mut AnchorWalk<'_>,
        edge_type: &EdgeType,
    ) -> Result<Vec<GraphEvidence>, crate::error::CollaboratorError> {
        let parents = self.sorted_edges(walk.tenant, walk.anchor, &EdgeType::PartOf, Direction::Outgoing)?;
        let mut out = Vec::new();
        for parent_edge in parents {
            let edges = self.sorted_edges(walk.tenant, &parent_edge.to, edge_type, Direction::Outgoing)?;
            out.extend(self.collect(walk, edges, Direction::Outgoing, TraversalKind::Cascading, MAX_TRAVERSAL_DEPTH)?);
        }
        Ok(out)
    }

    fn collect(
        &self,
        walk: &mut AnchorWalk<'_>,
        edges: Vec<GraphEdge>,
        direction: Direction,
        kind: TraversalKind,
        depth: u8,
    ) -> Result<Vec<GraphEvidence>, crate::error::CollaboratorError> {
        let mut out = Vec::new();
        for edge in edges {
            let target = edge.far_end(direction).clone();
            if walk.seen.contains(&target) {
                continue;
            }
            let Some(node) = self.graph.node(walk.tenant, &target)? else {
                debug!(node = %target, "dangling edge target skipped");
                continue;
            };
            walk.seen.insert(target);
            out.push(GraphEvidence {
                anchor: walk.anchor.clone(),
                node,
                edge,
                kind,
                depth,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::error::CollaboratorError;
    use crate::graph::Provenance;
    use crate::intent::Intent;
    use crate::storage::InMemoryGraph;

    fn tenant() -> TenantId {
        TenantId::new("yacht-1")
    }

    fn fixture() -> Arc<InMemoryGraph> {
        let g = InMemoryGraph::new();
        let t = tenant();
        for (id, kind, label) in [
            ("GEN_1", EntityKind::Equipment, "Port Generator"),
            ("OF_1", EntityKind::Part, "Oil Filter CAT 1R-0751"),
            ("IMP_1", EntityKind::Part, "Raw Water Impeller"),
            ("PUMP_1", EntityKind::Equipment, "Raw Water Pump"),
            ("COOL_1", EntityKind::Equipment, "Generator Cooling System"),
            ("E047", EntityKind::FaultCode, "E047 High coolant temperature"),
        ] {
            g.insert_node(&t, GraphNode::new(id, kind, label)).unwrap();
        }
        g.insert_edge(
            &t,
            GraphEdge::new("GEN_1", EdgeType::UsesPart, "OF_1")
                .with_confidence(0.9)
                .with_provenance(Provenance::document("manual-gen").with_chunk("p12")),
        )
        .unwrap();
        g.insert_edge(&t, GraphEdge::new("PUMP_1", EdgeType::PartOf, "GEN_1")).unwrap();
        g.insert_edge(&t, GraphEdge::new("PUMP_1", EdgeType::UsesPart, "IMP_1")).unwrap();
        g.insert_edge(&t, GraphEdge::new("PUMP_1", EdgeType::PartOf, "COOL_1")).unwrap();
        g.insert_edge(&t, GraphEdge::new("COOL_1", EdgeType::HasFault, "E047")).unwrap();
        g.insert_edge(&t, GraphEdge::new("GEN_1", EdgeType::UsesPart, "GHOST")).unwrap();
        Arc::new(g)
    }

    #[test]
    fn direct_step_carries_provenance() {
        let engine = TraversalEngine::new(fixture());
        let plan = [crate::intent::PlanStep {
            kind: TraversalKind::Direct,
            edge_type: EdgeType::UsesPart,
        }];
        let set = engine.traverse(&tenant(), &[CanonicalId::new("GEN_1")], &plan);

        assert_eq!(set.items.len(), 1, "dangling GHOST target is skipped");
        let ev = &set.items[0];
        assert_eq!(ev.node.id.as_str(), "OF_1");
        assert_eq!(ev.depth, 1);
        assert_eq!(ev.edge.provenance.as_ref().unwrap().to_string(), "manual-gen#p12");
        assert!(set.anchors.contains_key(&CanonicalId::new("GEN_1")));
    }

    #[test]
    fn parent_impact_follows_incoming_edges() {
        let engine = TraversalEngine::new(fixture());
        let plan = [crate::intent::PlanStep {
            kind: TraversalKind::ParentImpact,
            edge_type: EdgeType::PartOf,
        }];
        let set = engine.traverse(&tenant(), &[CanonicalId::new("GEN_1")], &plan);
        let ids: Vec<_> = set.items.iter().map(|e| e.node.id.as_str()).collect();
        assert_eq!(ids, vec!["PUMP_1"]);
    }

    #[test]
    fn cascading_reaches_depth_two_and_dedups() {
        let engine = TraversalEngine::new(fixture());
        let plan = Intent::Fault.traversal_plan();
        let set = engine.traverse(&tenant(), &[CanonicalId::new("PUMP_1")], &plan);

        let cascaded: Vec<_> = set
            .items
            .iter()
            .filter(|e| e.kind == TraversalKind::Cascading)
            .map(|e| (e.node.id.as_str(), e.depth))
            .collect();
        assert_eq!(cascaded, vec![("E047", 2)]);
        assert!(set.items.iter().all(|e| e.depth <= MAX_TRAVERSAL_DEPTH));

        let mut ids: Vec<_> = set.items.iter().map(|e| e.node.id.clone()).collect();
        let before = ids.len();
        ids.dedup();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn traversal_is_deterministic() {
        let engine = TraversalEngine::new(fixture());
        let plan = Intent::General.traversal_plan();
        let anchors = [CanonicalId::new("GEN_1"), CanonicalId::new("PUMP_1")];
        let a = engine.traverse(&tenant(), &anchors, &plan);
        let b = engine.traverse(&tenant(), &anchors, &plan);
        assert_eq!(a.items, b.items);
    }

    struct BrokenGraph;

    impl GraphReader for BrokenGraph {
        fn nodes_by_label(
            &self,
            _tenant: &TenantId,
            _kind: EntityKind,
            _text: &str,
        ) -> Result<Vec<GraphNode>, CollaboratorError> {
            Err(CollaboratorError::Unavailable("graph down".to_string()))
        }

        fn node(&self, _tenant: &TenantId, _id: &CanonicalId) -> Result<Option<GraphNode>, CollaboratorError> {
            Err(CollaboratorError::Unavailable("graph down".to_string()))
        }

        fn edges(
            &self,
            _tenant: &TenantId,
            _from: &CanonicalId,
            _edge_type: &EdgeType,
            _direction: Direction,
        ) -> Result<Vec<GraphEdge>, CollaboratorError> {
            Err(CollaboratorError::Unavailable("graph down".to_string()))
        }
    }

    #[test]
    fn failures_degrade_instead_of_failing() {
        let engine = TraversalEngine::new(Arc::new(BrokenGraph));
        let plan = Intent::Parts.traversal_plan();
        let set = engine.traverse(&tenant(), &[CanonicalId::new("GEN_1")], &plan);
        assert!(set.is_empty());
        assert_eq!(set.degradations.len(), 1 + plan.len());
        assert!(set.degradations.iter().all(|d| d.stage == DegradedStage::Graph));
    }
}
