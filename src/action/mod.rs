//! Follow-up actions.
//!
//! Actions are data. The [`ActionCatalog`] describes every action the engine
//! can offer, the [`PolicyTable`] says which roles may perform it, and the
//! [`ActionGate`] combines both with the owning entity's confidence to decide
//! what is attached to each result item.

mod gate;
mod policy;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::rank::{ItemType, ResultItem};

pub use gate::{decide, ActionGate, GateTier};
pub use policy::{default_rules, PolicyEffect, PolicyRule, PolicyTable, RoleSelector};

/// Read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// No state change.
    Read,
    /// Mutates records through the action-execution boundary.
    Write,
}

/// Consequence class of a write action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionImpact {
    /// Ordinary, reversible change.
    None,
    /// Commits money.
    Financial,
    /// Cannot be undone.
    Irreversible,
}

impl ActionImpact {
    /// Financial or irreversible.
    #[must_use]
    pub const fn is_inherent_risk(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Static catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    /// Stable id, referenced by the policy table.
    pub id: &'static str,
    /// Button label.
    pub label: &'static str,
    /// Read or write.
    pub kind: ActionKind,
    /// Consequence class.
    pub impact: ActionImpact,
    /// Endpoint contract of the action-execution boundary.
    pub endpoint: &'static str,
    /// Caller-supplied payload fields, templated as `null`.
    pub payload_fields: &'static [&'static str],
    /// Preconditions the execution boundary enforces.
    pub constraints: &'static [&'static str],
    /// Confirmation default at the highest confidence tier.
    pub confirm_by_default: bool,
    /// Result item types the action applies to.
    pub applies_to: &'static [ItemType],
}

impl ActionSpec {
    /// Returns true for write actions.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self.kind, ActionKind::Write)
    }

    /// Returns true if the action applies to `item_type`.
    #[must_use]
    pub fn applies_to(&self, item_type: ItemType) -> bool {
        self.applies_to.contains(&item_type)
    }

    /// Renders the descriptor for one result item.
    #[must_use]
    pub fn descriptor(&self, item: &ResultItem, requires_confirmation: bool) -> ActionDescriptor {
        let mut payload = Map::new();
        payload.insert("action_id".to_string(), json!(self.id));
        payload.insert("item_id".to_string(), json!(item.id));
        payload.insert("item_type".to_string(), json!(item.item_type));
        payload.insert(
            "entity_id".to_string(),
            item.anchor.as_ref().map_or(Value::Null, |id| json!(id)),
        );
        for field in self.payload_fields {
            payload.insert((*field).to_string(), Value::Null);
        }

        ActionDescriptor {
            label: self.label.to_string(),
            action_id: self.id.to_string(),
            endpoint: self.endpoint.to_string(),
            payload_template: Value::Object(payload),
            constraints: self.constraints.iter().map(|c| (*c).to_string()).collect(),
            requires_confirmation,
            kind: self.kind,
            impact: self.impact,
        }
    }
}

/// An action offered on a result item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Button label.
    pub label: String,
    /// Action id.
    pub action_id: String,
    /// Endpoint contract.
    pub endpoint: String,
    /// Payload with known fields filled and caller fields `null`.
    pub payload_template: Value,
    /// Preconditions.
    pub constraints: Vec<String>,
    /// UI must confirm before dispatch.
    pub requires_confirmation: bool,
    /// Read or write.
    pub kind: ActionKind,
    /// Consequence class.
    pub impact: ActionImpact,
}

impl ActionDescriptor {
    /// Returns true for write actions.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self.kind, ActionKind::Write)
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action_id)?;
        if self.requires_confirmation {
            write!(f, " (confirm)")?;
        }
        Ok(())
    }
}

const READ_ENDPOINT: &str = "GET /v1/items/{item_id}";
const EXECUTE_ENDPOINT: &str = "POST /v1/actions/execute";

const EVERYTHING: &[ItemType] = &ItemType::ALL;

const BUILTIN: &[ActionSpec] = &[
    ActionSpec {
        id: "view_details",
        label: "View details",
        kind: ActionKind::Read,
        impact: ActionImpact::None,
        endpoint: READ_ENDPOINT,
        payload_fields: &[],
        constraints: &[],
        confirm_by_default: false,
        applies_to: EVERYTHING,
    },
    ActionSpec {
        id: "view_history",
        label: "View history",
        kind: ActionKind::Read,
        impact: ActionImpact::None,
        endpoint: "GET /v1/items/{item_id}/history",
        payload_fields: &[],
        constraints: &[],
        confirm_by_default: false,
        applies_to: &[
            ItemType::Equipment,
            ItemType::Part,
            ItemType::FaultCode,
            ItemType::Maintenance,
            ItemType::History,
            ItemType::WorkOrder,
        ],
    },
    ActionSpec {
        id: "view_document",
        label: "Open document",
        kind: ActionKind::Read,
        impact: ActionImpact::None,
        endpoint: "GET /v1/documents/{item_id}",
        payload_fields: &[],
        constraints: &[],
        confirm_by_default: false,
        applies_to: &[ItemType::Document],
    },
    ActionSpec {
        id: "report_fault",
        label: "Report fault",
        kind: ActionKind::Write,
        impact: ActionImpact::None,
        endpoint: EXECUTE_ENDPOINT,
        payload_fields: &["description", "severity"],
        constraints: &["entity_id required"],
        confirm_by_default: false,
        applies_to: &[ItemType::Equipment, ItemType::Symptom, ItemType::FaultCode],
    },
    ActionSpec {
        id: "add_note",
        label: "Add note",
        kind: ActionKind::Write,
        impact: ActionImpact::None,
        endpoint: EXECUTE_ENDPOINT,
        payload_fields: &["text"],
        constraints: &[],
        confirm_by_default: false,
        applies_to: &[
            ItemType::Equipment,
            ItemType::Part,
            ItemType::FaultCode,
            ItemType::Maintenance,
            ItemType::History,
            ItemType::WorkOrder,
        ],
    },
    ActionSpec {
        id: "create_work_order",
        label: "Create work order",
        kind: ActionKind::Write,
        impact: ActionImpact::None,
        endpoint: EXECUTE_ENDPOINT,
        payload_fields: &["title", "description", "priority", "assignee"],
        constraints: &["entity_id required"],
        confirm_by_default: false,
        applies_to: &[
            ItemType::Equipment,
            ItemType::Symptom,
            ItemType::FaultCode,
            ItemType::Maintenance,
        ],
    },
    ActionSpec {
        id: "mark_maintenance_done",
        label: "Mark maintenance done",
        kind: ActionKind::Write,
        impact: ActionImpact::None,
        endpoint: EXECUTE_ENDPOINT,
        payload_fields: &["completed_at", "running_hours", "notes"],
        constraints: &["entity_id required"],
        confirm_by_default: false,
        applies_to: &[ItemType::Maintenance],
    },
    ActionSpec {
        id: "order_part",
        label: "Order part",
        kind: ActionKind::Write,
        impact: ActionImpact::Financial,
        endpoint: EXECUTE_ENDPOINT,
        payload_fields: &["quantity", "supplier", "delivery_port"],
        constraints: &["quantity > 0"],
        confirm_by_default: true,
        applies_to: &[ItemType::Part],
    },
    ActionSpec {
        id: "approve_work_order",
        label: "Approve work order",
        kind: ActionKind::Write,
        impact: ActionImpact::Financial,
        endpoint: EXECUTE_ENDPOINT,
        payload_fields: &["budget", "comment"],
        constraints: &["work order must be open"],
        confirm_by_default: true,
        applies_to: &[ItemType::WorkOrder],
    },
    ActionSpec {
        id: "close_work_order",
        label: "Close work order",
        kind: ActionKind::Write,
        impact: ActionImpact::Irreversible,
        endpoint: EXECUTE_ENDPOINT,
        payload_fields: &["resolution", "closed_at"],
        constraints: &["work order must be approved"],
        confirm_by_default: true,
        applies_to: &[ItemType::WorkOrder],
    },
];

/// The set of actions the engine can offer.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    specs: Vec<ActionSpec>,
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ActionCatalog {
    /// The built-in fleet catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            specs: BUILTIN.to_vec(),
        }
    }

    /// Looks up an action.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ActionSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    /// Returns true if `id` is in the catalog.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Actions applicable to `item_type`, in catalog order.
    pub fn applicable(&self, item_type: ItemType) -> impl Iterator<Item = &ActionSpec> {
        self.specs.iter().filter(move |s| s.applies_to(item_type))
    }

    /// All specs in catalog order.
    #[must_use]
    pub fn specs(&self) -> &[ActionSpec] {
        &self.specs
    }
}
