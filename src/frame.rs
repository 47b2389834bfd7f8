//! SearchFrame: the structured response of a search.
//!
//! Unlike a flat hit list, a frame carries the resolved entities (including
//! the ones nobody could identify), the ranked result cards with their gated
//! actions, and the routing and degradation metadata needed to explain the
//! answer.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionDescriptor;
use crate::error::{Degradation, FleetError, FleetResult};
use crate::intent::Intent;
use crate::lane::{Lane, LaneDecision};
use crate::rank::{ItemType, ResultItem};
use crate::resolve::ResolvedEntity;

/// A ranked result card with its actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// The ranked item.
    #[serde(flatten)]
    pub item: ResultItem,
    /// Actions the caller may take on it.
    pub actions: Vec<ActionDescriptor>,
}

impl RankedResult {
    /// Returns true if any attached action is a write.
    #[must_use]
    pub fn has_write_action(&self) -> bool {
        self.actions.iter().any(ActionDescriptor::is_write)
    }

    /// Looks up an attached action.
    #[must_use]
    pub fn action(&self, action_id: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|a| a.action_id == action_id)
    }
}

/// Routing, timing and degradation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Lane the query was routed to.
    pub lane: Lane,
    /// Why.
    pub lane_reason: String,
    /// Classified intent. Absent for blocked queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// Wall-clock time spent in the engine.
    pub latency_ms: u64,
    /// Mentions detected.
    pub entity_count: usize,
    /// Mentions with a canonical id.
    pub resolved_count: usize,
    /// External calls that were skipped or failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
    /// When the frame was assembled.
    pub generated_at: DateTime<Utc>,
}

/// Response of [`crate::SearchEngine::search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFrame {
    /// Request id of the query.
    pub request_id: Uuid,
    /// Every mention, resolved or not, in text order.
    pub resolved_entities: Vec<ResolvedEntity>,
    /// Ranked results, best first.
    pub result_items: Vec<RankedResult>,
    /// Metadata.
    pub metadata: FrameMetadata,
    /// Explanation shown instead of results (blocked queries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl SearchFrame {
    /// Returns true if the query was rejected by the lane router.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.metadata.lane.is_blocked()
    }

    /// Returns true if any external call degraded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.metadata.degraded.is_empty()
    }

    /// Results of one type, in rank order.
    pub fn items_of_type(&self, item_type: ItemType) -> impl Iterator<Item = &RankedResult> {
        self.result_items.iter().filter(move |r| r.item.item_type == item_type)
    }

    /// Mentions no stage could resolve.
    pub fn unresolved(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.resolved_entities.iter().filter(|e| !e.is_resolved())
    }

    /// Serializes to compact JSON.
    ///
    /// # Errors
    ///
    /// A serialization failure is a defect and surfaces as `FleetError::Internal`.
    pub fn to_json(&self) -> FleetResult<String> {
        serde_json::to_string(self).map_err(|e| FleetError::internal(format!("frame serialization failed: {e}")))
    }

    /// Serializes to indented JSON.
    ///
    /// # Errors
    ///
    /// A serialization failure is a defect and surfaces as `FleetError::Internal`.
    pub fn to_json_pretty(&self) -> FleetResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FleetError::internal(format!("frame serialization failed: {e}")))
    }
}

/// Assembles a [`SearchFrame`]. No business logic.
#[derive(Debug)]
pub struct ResponseBuilder {
    request_id: Uuid,
    decision: LaneDecision,
    started: Instant,
    intent: Option<Intent>,
    entities: Vec<ResolvedEntity>,
    items: Vec<RankedResult>,
    degraded: Vec<Degradation>,
}

impl ResponseBuilder {
    /// Starts a frame for one request.
    #[must_use]
    pub fn new(request_id: Uuid, decision: LaneDecision, started: Instant) -> Self {
        Self {
            request_id,
            decision,
            started,
            intent: None,
            entities: Vec::new(),
            items: Vec::new(),
            degraded: Vec::new(),
        }
    }

    /// Sets the intent.
    #[must_use]
    pub const fn intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    /// Sets the resolved entities.
    #[must_use]
    pub fn entities(mut self, entities: Vec<ResolvedEntity>) -> Self {
        self.entities = entities;
        self
    }

    /// Appends a ranked item with its actions.
    #[must_use]
    pub fn item(mut self, item: ResultItem, actions: Vec<ActionDescriptor>) -> Self {
        self.items.push(RankedResult { item, actions });
        self
    }

    /// Records degradations.
    #[must_use]
    pub fn degraded(mut self, degradations: impl IntoIterator<Item = Degradation>) -> Self {
        self.degraded.extend(degradations);
        self
    }

    /// Finishes the frame, stamping latency.
    #[must_use]
    pub fn build(self) -> SearchFrame {
        let latency_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let notice = self
            .decision
            .lane
            .is_blocked()
            .then(|| format!("query not processed: {}", self.decision.reason));
        SearchFrame {
            request_id: self.request_id,
            metadata: FrameMetadata {
                lane: self.decision.lane,
                lane_reason: self.decision.reason,
                intent: self.intent,
                latency_ms,
                entity_count: self.entities.len(),
                resolved_count: self.entities.iter().filter(|e| e.is_resolved()).count(),
                degraded: self.degraded,
                generated_at: Utc::now(),
            },
            resolved_entities: self.entities,
            result_items: self.items,
            notice,
        }
    }
}
