//! Intent classification.
//!
//! The intent selects the traversal plan, the structured record kinds worth
//! fetching, whether recency matters, and the tie-break order of result types.
//! Everything intent-specific lives in fixed tables here.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extract::FAULT_CODE_SHAPE;
use crate::graph::{EdgeType, TraversalKind};
use crate::rank::ItemType;
use crate::storage::RecordKind;

/// What the user is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Open a new work order.
    CreateWorkOrder,
    /// Look back at past events.
    History,
    /// Diagnose a fault or symptom.
    Fault,
    /// Scheduled maintenance and intervals.
    Maintenance,
    /// Spares and consumables.
    Parts,
    /// Manuals and procedures.
    Documents,
    /// Nothing more specific matched.
    General,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateWorkOrder => "create_work_order",
            Self::History => "history",
            Self::Fault => "fault",
            Self::Maintenance => "maintenance",
            Self::Parts => "parts",
            Self::Documents => "documents",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

struct Rules {
    table: Vec<(Intent, Regex)>,
}

static RULES: OnceLock<Rules> = OnceLock::new();

fn rules() -> &'static Rules {
    RULES.get_or_init(|| {
        let fault_code = format!(r"\b{FAULT_CODE_SHAPE}\b");
        let raw: [(Intent, &str); 7] = [
            (
                Intent::CreateWorkOrder,
                r"\b(?:create|open|raise|log|new)\b.*\b(?:work\s*order|wo|job|ticket)\b",
            ),
            (
                Intent::History,
                r"\b(?:history|last\s+time|previous|previously|when\s+did|past|logged|happened)\b",
            ),
            (
                Intent::Fault,
                r"\b(?:fault|faults|alarm|alarms|error|failure|failed|leak\w*|overheat\w*|vibrat\w*|noise|noisy|smok\w*)\b",
            ),
            (
                Intent::Maintenance,
                r"\b(?:due|service|servicing|maintenance|oil\s+change|interval|overdue|inspection|pms)\b",
            ),
            // A bare code shape is weaker evidence than a maintenance keyword.
            (Intent::Fault, fault_code.as_str()),
            (
                Intent::Parts,
                r"\b(?:part|parts|spare|spares|filter\w*|stock|inventory|impeller\w*|belt\w*|anode\w*)\b",
            ),
            (
                Intent::Documents,
                r"\b(?:manual|manuals|procedure|procedures|document\w*|drawing\w*|schematic\w*|how\s+to|how\s+do)\b",
            ),
        ];
        let table = raw
            .into_iter()
            .map(|(intent, pattern)| {
                let re = Regex::new(pattern).expect("built-in intent rules are valid regexes");
                (intent, re)
            })
            .collect();
        Rules { table }
    })
}

/// Classifies politeness-normalized, lowercase text. First matching rule wins.
#[must_use]
pub fn classify(normalized_text: &str) -> Intent {
    rules()
        .table
        .iter()
        .find(|(_, re)| re.is_match(normalized_text))
        .map_or(Intent::General, |(intent, _)| *intent)
}

/// One traversal step of an intent's plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// Traversal pattern.
    pub kind: TraversalKind,
    /// Relationship to follow.
    pub edge_type: EdgeType,
}

const fn step(kind: TraversalKind, edge_type: EdgeType) -> PlanStep {
    PlanStep { kind, edge_type }
}

impl Intent {
    /// History-oriented intents get recency scoring.
    #[must_use]
    pub const fn is_history_oriented(self) -> bool {
        matches!(self, Self::History | Self::Fault)
    }

    /// Fixed traversal plan for the intent.
    #[must_use]
    pub fn traversal_plan(self) -> Vec<PlanStep> {
        use TraversalKind::{Cascading, Direct, ParentImpact};
        match self {
            Self::Fault => vec![
                step(Direct, EdgeType::HasFault),
                step(Direct, EdgeType::HasSymptom),
                step(ParentImpact, EdgeType::PartOf),
                step(Cascading, EdgeType::HasFault),
            ],
            Self::Parts => vec![
                step(Direct, EdgeType::UsesPart),
                step(ParentImpact, EdgeType::UsesPart),
                step(Cascading, EdgeType::UsesPart),
            ],
            Self::Maintenance | Self::CreateWorkOrder => vec![
                step(Direct, EdgeType::UsesPart),
                step(Direct, EdgeType::DocumentedIn),
                step(ParentImpact, EdgeType::PartOf),
            ],
            Self::Documents => vec![
                step(Direct, EdgeType::DocumentedIn),
                step(Cascading, EdgeType::DocumentedIn),
            ],
            Self::History => vec![step(Direct, EdgeType::HasFault)],
            Self::General => vec![
                step(Direct, EdgeType::UsesPart),
                step(Direct, EdgeType::HasSymptom),
                step(ParentImpact, EdgeType::PartOf),
            ],
        }
    }

    /// Structured record kinds fetched for resolved entities.
    #[must_use]
    pub fn record_kinds(self) -> &'static [RecordKind] {
        match self {
            Self::Maintenance => &[RecordKind::Maintenance],
            Self::CreateWorkOrder => &[RecordKind::Maintenance, RecordKind::WorkOrder],
            Self::History => &[RecordKind::History, RecordKind::WorkOrder],
            Self::Fault => &[RecordKind::History],
            Self::Parts | Self::Documents => &[],
            Self::General => &[RecordKind::Maintenance, RecordKind::History],
        }
    }

    /// Tie-break order of result item types (earlier wins).
    #[must_use]
    pub fn type_priority(self) -> &'static [ItemType] {
        use ItemType::{
            Document, Equipment, FaultCode, History, Maintenance, Part, Person, Symptom, WorkOrder,
        };
        match self {
            Self::Maintenance => &[Maintenance, Equipment, Part, WorkOrder, Document, History, FaultCode, Symptom, Person],
            Self::CreateWorkOrder => &[Equipment, WorkOrder, Maintenance, FaultCode, Symptom, Part, Document, History, Person],
            Self::History => &[History, WorkOrder, Equipment, FaultCode, Symptom, Maintenance, Part, Document, Person],
            Self::Fault => &[FaultCode, Symptom, Equipment, History, Document, Part, WorkOrder, Maintenance, Person],
            Self::Parts => &[Part, Equipment, Document, Maintenance, WorkOrder, History, FaultCode, Symptom, Person],
            Self::Documents => &[Document, Equipment, Part, Maintenance, FaultCode, Symptom, History, WorkOrder, Person],
            Self::General => &[Equipment, Maintenance, FaultCode, Symptom, Part, Document, History, WorkOrder, Person],
        }
    }

    /// Position of `item_type` in the tie-break table (lower wins).
    #[must_use]
    pub fn priority_of(self, item_type: ItemType) -> usize {
        self.type_priority()
            .iter()
            .position(|t| *t == item_type)
            .unwrap_or(usize::MAX)
    }
}
