use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::{ActionCatalog, ActionDescriptor, ActionSpec};
use crate::confidence::ConfidenceThresholds;
use crate::lane::Lane;
use crate::query::Role;
use crate::rank::ResultItem;
use crate::resolve::ResolvedEntity;
use crate::storage::RolePolicyStore;

/// Confidence tier of a result item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateTier {
    /// Reads only: unresolved, not confident, blocked, or below the mid threshold.
    ReadOnly,
    /// Writes with confirmation; financial and irreversible actions suppressed.
    Confirm,
    /// Every policy-allowed action.
    Full,
}

impl GateTier {
    /// Tier of an item whose owning entity has `confidence` (`None` if unresolved).
    #[must_use]
    pub fn classify(confidence: Option<f32>, lane: Lane, thresholds: &ConfidenceThresholds) -> Self {
        match confidence {
            _ if !lane.permits_write_actions() => Self::ReadOnly,
            Some(c) if c >= thresholds.gate_high => Self::Full,
            Some(c) if c >= thresholds.gate_mid => Self::Confirm,
            _ => Self::ReadOnly,
        }
    }
}

/// Gate decision for one action: `None` to suppress, otherwise the
/// `requires_confirmation` flag.
///
/// ```
/// use fleetql::action::{decide, ActionCatalog, GateTier};
///
/// let catalog = ActionCatalog::builtin();
/// let create = catalog.get("create_work_order").unwrap();
/// assert_eq!(decide(create, true, GateTier::Full), Some(false));
/// assert_eq!(decide(create, true, GateTier::Confirm), Some(true));
/// assert_eq!(decide(create, true, GateTier::ReadOnly), None);
/// assert_eq!(decide(create, false, GateTier::Full), None);
/// ```
#[must_use]
pub fn decide(spec: &ActionSpec, policy_allows: bool, tier: GateTier) -> Option<bool> {
    if !policy_allows {
        return None;
    }
    if !spec.is_write() {
        return Some(spec.confirm_by_default);
    }
    match tier {
        GateTier::ReadOnly => None,
        GateTier::Confirm if spec.impact.is_inherent_risk() => None,
        GateTier::Confirm => Some(true),
        GateTier::Full => Some(spec.confirm_by_default || spec.impact.is_inherent_risk()),
    }
}

/// Attaches role- and confidence-filtered actions to result items.
///
/// Pure: the policy store is a local table lookup and nothing here performs I/O.
#[derive(Clone)]
pub struct ActionGate {
    catalog: Arc<ActionCatalog>,
    policy: Arc<dyn RolePolicyStore>,
    thresholds: ConfidenceThresholds,
}

impl std::fmt::Debug for ActionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionGate")
            .field("actions", &self.catalog.specs().len())
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl ActionGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(
        catalog: Arc<ActionCatalog>,
        policy: Arc<dyn RolePolicyStore>,
        thresholds: ConfidenceThresholds,
    ) -> Self {
        Self {
            catalog,
            policy,
            thresholds,
        }
    }

    /// Tier for an item given its owning entity. An owner that is unresolved
    /// or below the "confident" line is treated as absent.
    #[must_use]
    pub fn tier(&self, owner: Option<&ResolvedEntity>, lane: Lane) -> GateTier {
        let confidence = owner
            .filter(|e| e.is_confident(&self.thresholds))
            .map(|e| e.confidence.total());
        GateTier::classify(confidence, lane, &self.thresholds)
    }

    /// Actions for `item`, in catalog order.
    #[must_use]
    pub fn actions_for(
        &self,
        item: &ResultItem,
        owner: Option<&ResolvedEntity>,
        role: &Role,
        lane: Lane,
    ) -> Vec<ActionDescriptor> {
        let tier = self.tier(owner, lane);
        self.catalog
            .applicable(item.item_type)
            .filter_map(|spec| {
                let allowed = self.policy.allowed(role, spec.id);
                decide(spec, allowed, tier).map(|confirm| spec.descriptor(item, confirm))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::PolicyTable;
    use crate::confidence::{ConfidenceScore, ResolutionStage, ResolutionWeights, StageScores};
    use crate::entity::{CanonicalId, EntityKind, EntityMention, TextSpan};
    use crate::rank::{ItemScores, ItemType};

    fn gate() -> ActionGate {
        let catalog = Arc::new(ActionCatalog::builtin());
        let policy = Arc::new(PolicyTable::fleet_default(&catalog).unwrap());
        ActionGate::new(catalog, policy, ConfidenceThresholds::default())
    }

    fn entity(total_via_alias: f32, resolved: bool) -> ResolvedEntity {
        let mut s = StageScores::default();
        s.record(ResolutionStage::CanonicalRule, 1.0);
        s.record(ResolutionStage::AliasTable, 1.0);
        let weights = ResolutionWeights {
            pattern: 0.0,
            alias: total_via_alias,
            graph_label: 0.0,
            embedding: 1.0 - total_via_alias,
        };
        ResolvedEntity {
            mention: EntityMention::pattern("generator", EntityKind::Equipment, TextSpan { start: 0, end: 9 }),
            canonical_id: resolved.then(|| CanonicalId::new("GEN_1")),
            canonical_token: Some("GENERATOR".to_string()),
            confidence: ConfidenceScore::weigh(s, &weights),
            resolved_by: resolved.then_some(ResolutionStage::AliasTable),
        }
    }

    fn item(item_type: ItemType) -> ResultItem {
        ResultItem {
            id: "x1".to_string(),
            item_type,
            title: "x".to_string(),
            anchor: Some(CanonicalId::new("GEN_1")),
            evidence_refs: vec![],
            scores: ItemScores::default(),
            total: 0.5,
            timestamp: None,
            due_in_hours: None,
        }
    }

    fn ids(actions: &[ActionDescriptor]) -> Vec<&str> {
        actions.iter().map(|a| a.action_id.as_str()).collect()
    }

    #[test]
    fn tiers_follow_thresholds() {
        let t = ConfidenceThresholds::default();
        assert_eq!(GateTier::classify(Some(0.85), Lane::RuleBased, &t), GateTier::Full);
        assert_eq!(GateTier::classify(Some(0.8), Lane::RuleBased, &t), GateTier::Full);
        assert_eq!(GateTier::classify(Some(0.7), Lane::ModelAssisted, &t), GateTier::Confirm);
        assert_eq!(GateTier::classify(Some(0.59), Lane::RuleBased, &t), GateTier::ReadOnly);
        assert_eq!(GateTier::classify(None, Lane::RuleBased, &t), GateTier::ReadOnly);
        assert_eq!(GateTier::classify(Some(1.0), Lane::Blocked, &t), GateTier::ReadOnly);
    }

    #[test]
    fn unresolved_owner_gets_reads_only_for_any_role() {
        let g = gate();
        let owner = entity(0.9, false);
        for role in [Role::Crew, Role::Engineer, Role::Captain] {
            let actions = g.actions_for(&item(ItemType::Equipment), Some(&owner), &role, Lane::RuleBased);
            assert!(actions.iter().all(|a| !a.is_write()), "{role}");
            assert!(!actions.is_empty());
        }
        let actions = g.actions_for(&item(ItemType::Equipment), None, &Role::Captain, Lane::RuleBased);
        assert!(actions.iter().all(|a| !a.is_write()));
    }

    #[test]
    fn mid_tier_confirms_and_suppresses_financial() {
        let g = gate();
        let owner = entity(0.7, true);
        let actions = g.actions_for(&item(ItemType::WorkOrder), Some(&owner), &Role::Captain, Lane::RuleBased);
        assert_eq!(ids(&actions), vec!["view_details", "view_history", "add_note"]);
        assert!(actions.iter().filter(|a| a.is_write()).all(|a| a.requires_confirmation));
    }

    #[test]
    fn high_tier_keeps_confirmation_on_risky_actions() {
        let g = gate();
        let owner = entity(0.9, true);
        let actions = g.actions_for(&item(ItemType::WorkOrder), Some(&owner), &Role::Captain, Lane::RuleBased);
        assert_eq!(
            ids(&actions),
            vec!["view_details", "view_history", "add_note", "approve_work_order", "close_work_order"]
        );
        let note = actions.iter().find(|a| a.action_id == "add_note").unwrap();
        assert!(!note.requires_confirmation);
        let close = actions.iter().find(|a| a.action_id == "close_work_order").unwrap();
        assert!(close.requires_confirmation);
    }

    #[test]
    fn role_differentiates_at_the_same_confidence() {
        let g = gate();
        let owner = entity(0.9, true);
        let crew = g.actions_for(&item(ItemType::Maintenance), Some(&owner), &Role::Crew, Lane::RuleBased);
        let engineer = g.actions_for(&item(ItemType::Maintenance), Some(&owner), &Role::Engineer, Lane::RuleBased);
        assert_eq!(ids(&crew), vec!["view_details", "view_history", "add_note"]);
        assert_eq!(
            ids(&engineer),
            vec!["view_details", "view_history", "add_note", "create_work_order", "mark_maintenance_done"]
        );
    }
}
