//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use fleetql::graph::{EdgeType, GraphEdge, GraphNode, Provenance};
use fleetql::storage::{DocumentHit, InMemoryStores, RecordKind, StructuredRecord};
use fleetql::{EntityKind, Query, Role, TenantId, UserId};

pub const TENANT: &str = "yacht-1";

pub fn tenant() -> TenantId {
    TenantId::new(TENANT)
}

pub fn query(text: &str, role: Role) -> Query {
    Query::new(text, UserId::new("u-17"), role, tenant())
}

/// Alias `generator → GEN_1` and a maintenance interval due in 10 hours.
pub fn generator_stores() -> InMemoryStores {
    let stores = InMemoryStores::new();
    let t = tenant();
    stores.aliases.insert(&t, EntityKind::Equipment, "generator", "GEN_1").unwrap();
    stores
        .records
        .insert_record(
            &t,
            StructuredRecord {
                id: "mi-gen1-500h".to_string(),
                kind: RecordKind::Maintenance,
                entity_id: "GEN_1".into(),
                title: "Generator 500h oil change".to_string(),
                timestamp: None,
                due_in_hours: Some(10.0),
                provenance: Some(Provenance::document("pms-2024").with_chunk("gen1-intervals")),
            },
        )
        .unwrap();
    stores
}

/// A small engine room: two generators, shared parts, faults, a manual and history.
pub fn engine_room_stores() -> InMemoryStores {
    let stores = generator_stores();
    let t = tenant();
    let g = &stores.graph;

    for node in [
        GraphNode::new("GEN_1", EntityKind::Equipment, "Generator 1"),
        GraphNode::new("GEN_2", EntityKind::Equipment, "Generator 2"),
        GraphNode::new("POWER_PLANT", EntityKind::Equipment, "Power plant"),
        GraphNode::new("PART_OIL_FILTER_G", EntityKind::Part, "Generator oil filter"),
        GraphNode::new("PART_IMPELLER_G", EntityKind::Part, "Generator raw water impeller"),
        GraphNode::new("FAULT_E047", EntityKind::FaultCode, "E047 high coolant temperature"),
        GraphNode::new("DOC_GEN_MANUAL", EntityKind::Document, "Generator service manual"),
    ] {
        g.insert_node(&t, node).unwrap();
    }

    let manual = Provenance::document("DOC_GEN_MANUAL").with_chunk("p42");
    for edge in [
        GraphEdge::new("GEN_1", EdgeType::UsesPart, "PART_OIL_FILTER_G").with_provenance(manual.clone()),
        GraphEdge::new("GEN_1", EdgeType::UsesPart, "PART_IMPELLER_G")
            .with_confidence(0.9)
            .with_provenance(manual.clone()),
        GraphEdge::new("GEN_2", EdgeType::UsesPart, "PART_OIL_FILTER_G"),
        GraphEdge::new("GEN_1", EdgeType::PartOf, "POWER_PLANT"),
        GraphEdge::new("GEN_2", EdgeType::PartOf, "POWER_PLANT"),
        GraphEdge::new("GEN_1", EdgeType::HasFault, "FAULT_E047").with_provenance(Provenance::document("alarm-log")),
        GraphEdge::new("GEN_1", EdgeType::DocumentedIn, "DOC_GEN_MANUAL"),
    ] {
        g.insert_edge(&t, edge).unwrap();
    }

    let now = Utc::now();
    for (id, days, title) in [
        ("h-1", 2, "Generator 1 coolant alarm reset"),
        ("h-2", 90, "Generator 1 overheating, thermostat replaced"),
    ] {
        stores
            .records
            .insert_record(
                &t,
                StructuredRecord {
                    id: id.to_string(),
                    kind: RecordKind::History,
                    entity_id: "GEN_1".into(),
                    title: title.to_string(),
                    timestamp: Some(now - ChronoDuration::days(days)),
                    due_in_hours: None,
                    provenance: None,
                },
            )
            .unwrap();
    }
    stores
        .records
        .insert_record(
            &t,
            StructuredRecord {
                id: "wo-311".to_string(),
                kind: RecordKind::WorkOrder,
                entity_id: "GEN_1".into(),
                title: "Replace generator 1 impeller".to_string(),
                timestamp: Some(now - ChronoDuration::days(5)),
                due_in_hours: None,
                provenance: None,
            },
        )
        .unwrap();

    stores
        .records
        .insert_document(
            &t,
            DocumentHit {
                id: "DOC_GEN_MANUAL".to_string(),
                title: "Generator service manual".to_string(),
                excerpt: "Oil change every 500 running hours; replace the oil filter.".to_string(),
                entity_ids: vec!["GEN_1".into()],
                timestamp: None,
                provenance: Some(Provenance::document("DOC_GEN_MANUAL")),
            },
        )
        .unwrap();

    // Uniform direction: cosine with any single-token query stays far below the cut-off.
    stores.vectors.insert(&t, "GEN_1", vec![0.125; 64]).unwrap();
    stores
}
