//! Lane routing.
//!
//! Before any extraction happens, a query is classified into a processing
//! lane that bounds its cost: blocked queries do no work, rule-based queries
//! never call the model, and only the model lanes may pay for an external
//! extraction call. Routing is a pure function of the query string.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::vocabulary::Vocabulary;

/// Processing lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Off-domain, greeting, empty, or oversized input. No downstream work.
    Blocked,
    /// Unambiguous command. Pattern extraction only.
    RuleBased,
    /// Known domain vocabulary; patterns first, the model may add mentions.
    RuleBasedPlusModel,
    /// Everything else that is not blocked.
    ModelAssisted,
}

impl Lane {
    /// Whether the external extraction capability may be invoked.
    #[must_use]
    pub const fn permits_model_extraction(self) -> bool {
        matches!(self, Self::RuleBasedPlusModel | Self::ModelAssisted)
    }

    /// Whether any write action may ever be offered for this lane.
    #[must_use]
    pub const fn permits_write_actions(self) -> bool {
        !matches!(self, Self::Blocked)
    }

    /// Returns true for the blocked lane.
    #[must_use]
    pub const fn is_blocked(self) -> bool {
        matches!(self, Self::Blocked)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked => write!(f, "blocked"),
            Self::RuleBased => write!(f, "rule_based"),
            Self::RuleBasedPlusModel => write!(f, "rule_based_plus_model"),
            Self::ModelAssisted => write!(f, "model_assisted"),
        }
    }
}

/// Outcome of routing one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneDecision {
    /// Selected lane.
    pub lane: Lane,
    /// Human-readable reason.
    pub reason: String,
    /// Query text after politeness normalization (lowercase).
    pub normalized_text: String,
}

impl LaneDecision {
    fn new(lane: Lane, reason: impl Into<String>, normalized_text: String) -> Self {
        Self {
            lane,
            reason: reason.into(),
            normalized_text,
        }
    }
}

/// Routes query text to a lane.
pub trait LaneRouter: Send + Sync {
    /// Classifies the query. Never fails.
    fn route(&self, text: &str) -> LaneDecision;
}

struct Guards {
    polite_prefix: Regex,
    polite_suffix: Regex,
    greeting_only: Regex,
    off_domain: Regex,
    imperative: Regex,
    ambiguous: Regex,
}

static GUARDS: OnceLock<Guards> = OnceLock::new();

fn guards() -> &'static Guards {
    GUARDS.get_or_init(|| Guards {
        polite_prefix: Regex::new(
            r"^(?:(?:could|can|would|will)\s+(?:you|u)(?:\s+please)?|please|pls|plz|kindly|i(?:'d|\s+would)\s+like\s+(?:you\s+)?to|i\s+(?:want|need)\s+you\s+to|(?:hi|hello|hey)(?:\s+there)?|ok(?:ay)?)[,\s]+",
        )
        .expect("valid polite prefix regex"),
        polite_suffix: Regex::new(r"[\s,]*(?:\b(?:please|thanks|thank\s+you|thx|cheers)\b)?[\s.!?]*$")
            .expect("valid polite suffix regex"),
        greeting_only: Regex::new(
            r"^(?:hi|hello|hey|yo|good\s+(?:morning|afternoon|evening|night)|thanks|thank\s+you|thx|cheers|bye|goodbye|ok|okay)(?:\s+(?:there|all|team|mate|everyone))?[\s.!?]*$",
        )
        .expect("valid greeting regex"),
        off_domain: Regex::new(
            r"\b(?:joke|jokes|poem|song|lyrics|movie|film|recipe|horoscope|lottery|who\s+are\s+you|your\s+name|tell\s+me\s+about\s+yourself)\b",
        )
        .expect("valid off-domain regex"),
        imperative: Regex::new(
            r"^(?P<verb>create|open|raise|log|add|record|report|schedule|assign|approve|reject|close|mark|order|book|update|show|list|find|view|display)\b",
        )
        .expect("valid imperative regex"),
        ambiguous: Regex::new(r"\b(?:it|that|this\s+one|them|those|something|whatever|either|or)\b")
            .expect("valid ambiguity regex"),
    })
}

/// Strips politeness prefixes and suffixes, lowercases, collapses whitespace.
///
/// Prefixes are stripped repeatedly, so "hi, could you please create…" and
/// "create…" normalize to the same text.
///
/// ```
/// use fleetql::lane::normalize_politeness;
///
/// assert_eq!(
///     normalize_politeness("Could you please create a work order for the generator?"),
///     "create a work order for the generator"
/// );
/// ```
#[must_use]
pub fn normalize_politeness(text: &str) -> String {
    let g = guards();
    let mut s = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();

    loop {
        let stripped = g.polite_prefix.replace(&s, "").into_owned();
        if stripped == s {
            break;
        }
        s = stripped;
    }

    g.polite_suffix.replace(&s, "").trim().to_string()
}

/// Guard-rule router.
///
/// Guards, in order:
/// 1. empty, oversized, greeting-only, or off-domain → `Blocked`
/// 2. unambiguous imperative (after politeness normalization) → `RuleBased`
/// 3. known domain vocabulary → `RuleBasedPlusModel`
/// 4. anything else → `ModelAssisted`
#[derive(Debug, Clone, Copy)]
pub struct DefaultLaneRouter {
    max_query_chars: usize,
}

impl DefaultLaneRouter {
    /// Creates a router rejecting queries longer than `max_query_chars`.
    #[must_use]
    pub const fn new(max_query_chars: usize) -> Self {
        Self { max_query_chars }
    }
}

impl Default for DefaultLaneRouter {
    fn default() -> Self {
        Self::new(512)
    }
}

impl LaneRouter for DefaultLaneRouter {
    fn route(&self, text: &str) -> LaneDecision {
        let g = guards();
        let trimmed = text.trim();

        if trimmed.is_empty() {
            return LaneDecision::new(Lane::Blocked, "empty query", String::new());
        }
        let chars = trimmed.chars().count();
        if chars > self.max_query_chars {
            return LaneDecision::new(
                Lane::Blocked,
                format!("query exceeds {} characters ({chars})", self.max_query_chars),
                String::new(),
            );
        }

        let lowered = trimmed.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if g.greeting_only.is_match(&lowered) {
            return LaneDecision::new(Lane::Blocked, "greeting or small talk", lowered);
        }

        let normalized = normalize_politeness(trimmed);
        if normalized.is_empty() {
            return LaneDecision::new(Lane::Blocked, "no content after politeness", normalized);
        }

        let vocab = Vocabulary::builtin();
        let has_domain_term = vocab.mentions_any(&normalized);

        if g.off_domain.is_match(&normalized) && !has_domain_term {
            return LaneDecision::new(Lane::Blocked, "off-domain request", normalized);
        }

        if let Some(caps) = g.imperative.captures(&normalized) {
            if !g.ambiguous.is_match(&normalized) {
                let verb = caps.name("verb").map_or("", |m| m.as_str());
                let reason = format!("unambiguous imperative '{verb}'");
                return LaneDecision::new(Lane::RuleBased, reason, normalized);
            }
        }

        if has_domain_term {
            return LaneDecision::new(
                Lane::RuleBasedPlusModel,
                "domain vocabulary matched; model may add mentions",
                normalized,
            );
        }

        LaneDecision::new(Lane::ModelAssisted, "no deterministic rule matched", normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane(q: &str) -> Lane {
        DefaultLaneRouter::default().route(q).lane
    }

    #[test]
    fn greetings_are_blocked() {
        assert_eq!(lane("hello"), Lane::Blocked);
        assert_eq!(lane("Good morning team!"), Lane::Blocked);
        assert_eq!(lane("thanks"), Lane::Blocked);
    }

    #[test]
    fn empty_and_oversized_are_blocked() {
        assert_eq!(lane("   "), Lane::Blocked);
        let long = "engine ".repeat(200);
        let decision = DefaultLaneRouter::new(100).route(&long);
        assert_eq!(decision.lane, Lane::Blocked);
        assert!(decision.reason.contains("exceeds 100"));
    }

    #[test]
    fn off_domain_is_blocked_unless_domain_term_present() {
        assert_eq!(lane("tell me a joke"), Lane::Blocked);
        assert_eq!(lane("is the generator noise a joke"), Lane::RuleBasedPlusModel);
    }

    #[test]
    fn imperative_is_rule_based() {
        let decision = DefaultLaneRouter::default().route("create a work order for the generator");
        assert_eq!(decision.lane, Lane::RuleBased);
        assert!(decision.reason.contains("create"));
    }

    #[test]
    fn polite_imperative_is_rule_based() {
        for q in [
            "could you create a work order for the generator",
            "Please create a work order for the generator",
            "can you please create a work order for the generator?",
            "hi, could you create a work order for the generator please",
            "I'd like you to create a work order for the generator",
        ] {
            assert_eq!(lane(q), Lane::RuleBased, "query: {q}");
        }
    }

    #[test]
    fn ambiguous_imperative_falls_through() {
        assert_eq!(lane("create a work order for it"), Lane::ModelAssisted);
        assert_eq!(lane("open a job for the generator or the watermaker"), Lane::RuleBasedPlusModel);
    }

    #[test]
    fn domain_question_is_rule_based_plus_model() {
        assert_eq!(lane("generator oil change due"), Lane::RuleBasedPlusModel);
    }

    #[test]
    fn unknown_is_model_assisted() {
        assert_eq!(lane("why does the thing on deck 3 beep at night"), Lane::ModelAssisted);
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_politeness("Kindly, please show the oil filter.");
        assert_eq!(once, "show the oil filter");
        assert_eq!(normalize_politeness(&once), once);
    }

    #[test]
    fn lane_permissions() {
        assert!(!Lane::Blocked.permits_write_actions());
        assert!(!Lane::RuleBased.permits_model_extraction());
        assert!(Lane::RuleBasedPlusModel.permits_model_extraction());
        assert!(Lane::ModelAssisted.permits_model_extraction());
    }
}
