//! The immutable query value and caller identity types.
//!
//! A `Query` is created once per request and never mutated; every stage of
//! the pipeline borrows it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant (vessel or fleet account) scope for every collaborator lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a tenant ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the user issuing the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller role, the only input the action gate uses to differentiate users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    /// Deck or interior crew member.
    Crew,
    /// Engineering officer.
    Engineer,
    /// Head of the engine department.
    ChiefEngineer,
    /// Master of the vessel.
    Captain,
    /// Any other role known only to the policy store.
    Custom(String),
}

impl Role {
    /// Canonical string form used in policy tables and logs.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Crew => "crew",
            Self::Engineer => "engineer",
            Self::ChiefEngineer => "chief_engineer",
            Self::Captain => "captain",
            Self::Custom(name) => name.as_str(),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.is_empty() {
            return Err("role cannot be empty".to_string());
        }

        let normalized = value.to_ascii_lowercase().replace([' ', '-'], "_");
        Ok(match normalized.as_str() {
            "crew" => Self::Crew,
            "engineer" => Self::Engineer,
            "chief_engineer" | "chief" => Self::ChiefEngineer,
            "captain" | "master" => Self::Captain,
            _ => Self::Custom(normalized),
        })
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    request_id: Uuid,
    text: String,
    user_id: UserId,
    role: Role,
    tenant_id: TenantId,
    received_at: DateTime<Utc>,
}

impl Query {
    /// Creates a query stamped with the current time and a fresh request id.
    #[must_use]
    pub fn new(text: impl Into<String>, user_id: UserId, role: Role, tenant_id: TenantId) -> Self {
        Self::at(text, user_id, role, tenant_id, Utc::now())
    }

    /// Creates a query with an explicit receive time (tests, replays).
    #[must_use]
    pub fn at(
        text: impl Into<String>,
        user_id: UserId,
        role: Role,
        tenant_id: TenantId,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            text: text.into(),
            user_id,
            role,
            tenant_id,
            received_at,
        }
    }

    /// Per-request identifier.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Raw query text as typed.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Issuing user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Caller role.
    #[must_use]
    pub const fn role(&self) -> &Role {
        &self.role
    }

    /// Tenant scope.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Receive time; the reference point for recency scoring.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_known_names() {
        assert_eq!(Role::try_from("Crew".to_string()).unwrap(), Role::Crew);
        assert_eq!(Role::try_from("chief engineer".to_string()).unwrap(), Role::ChiefEngineer);
        assert_eq!(Role::try_from("Master".to_string()).unwrap(), Role::Captain);
    }

    #[test]
    fn role_keeps_unknown_names_as_custom() {
        let role: Role = "Shore Superintendent".parse().unwrap();
        assert_eq!(role, Role::Custom("shore_superintendent".to_string()));
        assert_eq!(role.as_str(), "shore_superintendent");
    }

    #[test]
    fn role_rejects_empty() {
        assert!(Role::try_from("   ".to_string()).is_err());
    }

    #[test]
    fn role_serde_roundtrips_as_string() {
        let json = serde_json::to_string(&Role::ChiefEngineer).unwrap();
        assert_eq!(json, "\"chief_engineer\"");
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::ChiefEngineer);
    }

    #[test]
    fn query_exposes_fields() {
        let q = Query::new("generator oil change due", UserId::new("u1"), Role::Engineer, TenantId::new("mv-aurora"));
        assert_eq!(q.text(), "generator oil change due");
        assert_eq!(q.tenant_id().as_str(), "mv-aurora");
        assert_eq!(q.role(), &Role::Engineer);
        assert!(!q.request_id().is_nil());
    }
}
