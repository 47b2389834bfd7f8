use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::ActionCatalog;
use crate::error::ValidationError;
use crate::query::Role;
use crate::storage::RolePolicyStore;

/// Which roles a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoleSelector {
    /// Every role (`*`).
    Any,
    /// One role.
    Role(Role),
}

impl RoleSelector {
    /// Returns true if the selector covers `role`.
    #[must_use]
    pub fn matches(&self, role: &Role) -> bool {
        match self {
            Self::Any => true,
            Self::Role(r) => r == role,
        }
    }
}

impl TryFrom<String> for RoleSelector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim() == "*" {
            return Ok(Self::Any);
        }
        Role::try_from(value).map(Self::Role)
    }
}

impl From<RoleSelector> for String {
    fn from(selector: RoleSelector) -> Self {
        selector.to_string()
    }
}

impl fmt::Display for RoleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Role(r) => write!(f, "{r}"),
        }
    }
}

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    /// Permit.
    Allow,
    /// Forbid. Wins over any allow.
    Deny,
}

/// One policy row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Roles covered.
    pub role: RoleSelector,
    /// Catalog action id.
    pub action_id: String,
    /// Effect.
    pub effect: PolicyEffect,
}

impl PolicyRule {
    /// Allow rule.
    #[must_use]
    pub fn allow(role: RoleSelector, action_id: impl Into<String>) -> Self {
        Self {
            role,
            action_id: action_id.into(),
            effect: PolicyEffect::Allow,
        }
    }

    /// Deny rule.
    #[must_use]
    pub fn deny(role: RoleSelector, action_id: impl Into<String>) -> Self {
        Self {
            role,
            action_id: action_id.into(),
            effect: PolicyEffect::Deny,
        }
    }
}

/// Role × action table. Deny wins; no matching row means deny.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
}

impl PolicyTable {
    /// Builds a table, rejecting rows that name actions absent from `catalog`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownPolicyAction` for the first unknown action id.
    pub fn new(rules: Vec<PolicyRule>, catalog: &ActionCatalog) -> Result<Self, ValidationError> {
        if let Some(bad) = rules.iter().find(|r| !catalog.contains(&r.action_id)) {
            return Err(ValidationError::UnknownPolicyAction {
                action_id: bad.action_id.clone(),
            });
        }
        Ok(Self { rules })
    }

    /// The default fleet policy over `catalog`.
    ///
    /// # Errors
    ///
    /// Fails only if `catalog` lacks one of the built-in action ids.
    pub fn fleet_default(catalog: &ActionCatalog) -> Result<Self, ValidationError> {
        Self::new(default_rules(), catalog)
    }

    /// Rows in table order.
    #[must_use]
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }
}

/// Default rows: everyone reads, reports faults and adds notes; engineers
/// also create work orders and sign off maintenance; chief engineer and
/// captain also approve, order parts and close.
#[must_use]
pub fn default_rules() -> Vec<PolicyRule> {
    let mut rules: Vec<PolicyRule> = ["view_details", "view_history", "view_document", "report_fault", "add_note"]
        .into_iter()
        .map(|a| PolicyRule::allow(RoleSelector::Any, a))
        .collect();

    for role in [Role::Engineer, Role::ChiefEngineer, Role::Captain] {
        for action in ["create_work_order", "mark_maintenance_done"] {
            rules.push(PolicyRule::allow(RoleSelector::Role(role.clone()), action));
        }
    }
    for role in [Role::ChiefEngineer, Role::Captain] {
        for action in ["approve_work_order", "order_part", "close_work_order"] {
            rules.push(PolicyRule::allow(RoleSelector::Role(role.clone()), action));
        }
    }
    rules
}

impl RolePolicyStore for PolicyTable {
    fn allowed(&self, role: &Role, action_id: &str) -> bool {
        let mut allowed = false;
        for rule in self
            .rules
            .iter()
            .filter(|r| r.action_id == action_id && r.role.matches(role))
        {
            match rule.effect {
                PolicyEffect::Deny => return false,
                PolicyEffect::Allow => allowed = true,
            }
        }
        allowed
    }
}
