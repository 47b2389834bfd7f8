//! Error types for FleetQL.
//!
//! All errors in FleetQL are strongly typed using thiserror.
//! Degradable collaborator failures are handled inside the pipeline and
//! never reach the caller as an error; what remains here is either a
//! rejected input, a cancelled/timed-out request, or a programmer error.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors that occur during configuration and input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Configuration value '{field}' = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Weights for '{group}' must sum to 1.0 (got {sum})")]
    WeightsDoNotSum {
        group: String,
        sum: f64,
    },

    #[error("Threshold ordering violated: {reason}")]
    ThresholdOrder {
        reason: String,
    },

    #[error("Policy table entry references unknown action '{action_id}'")]
    UnknownPolicyAction {
        action_id: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid configuration file: {message}")]
    InvalidConfig {
        message: String,
    },
}

/// Execution errors that occur while a search is running.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Search timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Search was cancelled by the caller")]
    Cancelled,

    #[error("Resolution task failed: {message}")]
    TaskFailed {
        message: String,
    },
}

/// Errors returned by external collaborators (alias table, graph, vector index,
/// extraction capability, record source).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator rejected request: {0}")]
    Rejected(String),

    #[error("Collaborator backend error: {0}")]
    Backend(String),
}

/// Pipeline stage that ran without one of its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedStage {
    /// Model-based mention extraction.
    Extraction,
    /// Alias-table lookup (resolution stage 2).
    Alias,
    /// Graph label hint or traversal.
    Graph,
    /// Vector-similarity lookup (resolution stage 4).
    Embedding,
    /// Document and structured record retrieval.
    Records,
    /// Resolution fan-out exceeded its deadline.
    Resolution,
}

impl fmt::Display for DegradedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Extraction => "extraction",
            Self::Alias => "alias",
            Self::Graph => "graph",
            Self::Embedding => "embedding",
            Self::Records => "records",
            Self::Resolution => "resolution",
        };
        f.write_str(s)
    }
}

/// A collaborator failure that was absorbed instead of surfaced.
///
/// Reported in response metadata so callers can tell a thin answer from an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    /// Affected stage.
    pub stage: DegradedStage,
    /// Short cause ("timeout after 500ms", backend message).
    pub reason: String,
}

impl Degradation {
    /// Creates a degradation record.
    #[must_use]
    pub fn new(stage: DegradedStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Top-level error type for FleetQL.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl FleetError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal (programmer) error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the request was cancelled or timed out.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::Cancelled | ExecutionError::Timeout { .. })
        )
    }

    /// HTTP-equivalent status class for the error (4xx vs 5xx).
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Execution(ExecutionError::Cancelled) => 499,
            Self::Execution(ExecutionError::Timeout { .. }) => 504,
            Self::Execution(_) | Self::Internal { .. } => 500,
        }
    }
}

/// Result type alias for FleetQL operations.
pub type FleetResult<T> = Result<T, FleetError>;
