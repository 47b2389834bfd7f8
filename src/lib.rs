//! # FleetQL - Query Understanding & Action Resolution for Fleet Operations
//!
//! FleetQL sits behind a single natural-language search box. It takes a free
//! text query, works out what the user means, resolves vague mentions ("the
//! engine", "2nd engineer") into canonical entities, walks the relationships
//! between equipment, parts, faults and documents, ranks the evidence, and
//! decides per role and per confidence which follow-up actions are safe to
//! offer.
//!
//! ## Pipeline
//!
//! - **Lane**: cost tier chosen before any extraction (blocked, rule-based, model-assisted)
//! - **Extraction**: dictionary and shape patterns, plus an optional model capability
//! - **Resolution**: a four-stage cascade producing a weighted [`ConfidenceScore`]
//! - **Traversal**: fixed-depth typed walks over the external graph
//! - **Ranking**: weighted text, entity-match, connectivity and recency scores
//! - **Action gate**: role policy plus confidence tiers
//! - **SearchFrame**: ranked cards, actions, every detected entity, metadata
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleetql::{EngineConfig, Query, Role, SearchEngine, TenantId, UserId};
//! use fleetql::storage::InMemoryStores;
//!
//! let stores = InMemoryStores::new();
//! let engine = SearchEngine::in_memory(&stores, EngineConfig::default())?;
//!
//! let query = Query::new(
//!     "generator oil change due",
//!     UserId::new("u-17"),
//!     Role::Engineer,
//!     TenantId::new("yacht-1"),
//! );
//! let frame = engine.search(&query).await?;
//! println!("{}", frame.to_json_pretty()?);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod confidence;
pub mod embedding;
pub mod entity;
pub mod error;
pub mod query;
pub mod vocabulary;

// Pipeline stages
pub mod action;
pub mod extract;
pub mod frame;
pub mod graph;
pub mod intent;
pub mod lane;
pub mod rank;
pub mod resolve;

// Orchestration, collaborators, configuration
pub mod config;
pub mod engine;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use action::{ActionCatalog, ActionDescriptor, ActionGate, ActionImpact, ActionKind, GateTier, PolicyTable};
pub use confidence::{ConfidenceScore, ConfidenceThresholds, ResolutionStage, ResolutionWeights, StageScores};
pub use entity::{CanonicalId, EntityKind, EntityMention, MentionSource};
pub use error::{
    CollaboratorError, Degradation, DegradedStage, ExecutionError, FleetError, FleetResult, ValidationError,
};
pub use frame::{FrameMetadata, RankedResult, ResponseBuilder, SearchFrame};
pub use graph::{Direction, EdgeType, GraphEdge, GraphNode, Provenance};
pub use intent::Intent;
pub use lane::{DefaultLaneRouter, Lane, LaneDecision, LaneRouter};
pub use query::{Query, Role, TenantId, UserId};
pub use rank::{ItemType, RankWeights, ResultItem};
pub use resolve::{EntityResolver, ResolvedEntity};

pub use config::EngineConfig;
pub use engine::{CancelToken, SearchEngine, SearchEngineBuilder};
