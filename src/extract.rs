//! Entity extraction.
//!
//! Pattern extraction always runs and is free. The model capability is only
//! consulted when the lane permits it, always under a timeout, and its
//! failure leaves the pattern mentions untouched.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::embedding::content_tokens;
use crate::entity::{normalize_phrase, EntityKind, EntityMention, TextSpan};
use crate::error::{Degradation, DegradedStage};
use crate::lane::Lane;
use crate::query::TenantId;
use crate::storage::ExtractionCapability;
use crate::vocabulary::Vocabulary;

/// Fault code shape: a short letter prefix, then a hyphen and two or more
/// digits, or three or more digits (`E047`, `SPN-100`). Model names such as
/// `C32` do not qualify.
pub(crate) const FAULT_CODE_SHAPE: &str = r"[a-z]{1,4}(?:-\d{2,5}|\d{3,5})";

struct Shapes {
    fault_code: Regex,
    document: Regex,
}

static SHAPES: OnceLock<Shapes> = OnceLock::new();

fn shapes() -> &'static Shapes {
    SHAPES.get_or_init(|| Shapes {
        fault_code: Regex::new(&format!(r"(?i)\b{FAULT_CODE_SHAPE}\b")).expect("valid fault code regex"),
        document: Regex::new(
            r"(?i)\b(?:(?P<subject>[a-z][a-z0-9-]*)\s+)?(?P<doc>manual|procedure|schematic|drawing|datasheet)s?\b",
        )
        .expect("valid document regex"),
    })
}

/// Canonical form of a fault code: upper case, separators removed (`spn-100` → `SPN100`).
#[must_use]
pub fn canonical_fault_code(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Dictionary and shape-based extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    /// Non-overlapping mentions in text order.
    ///
    /// Vocabulary hits claim their spans first; fault codes and document
    /// references only fill the remaining gaps.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<EntityMention> {
        let vocab = Vocabulary::builtin();
        let mut mentions: Vec<EntityMention> = vocab
            .find_all(text)
            .into_iter()
            .filter_map(|m| {
                let entry = vocab.entry(m.entry)?;
                Some(EntityMention::pattern(m.text, entry.kind, m.span))
            })
            .collect();

        let claimed = |mentions: &[EntityMention], span: &TextSpan| {
            mentions
                .iter()
                .filter_map(|m| m.span.as_ref())
                .any(|s| s.overlaps(span))
        };

        let s = shapes();
        for m in s.fault_code.find_iter(text) {
            let span = TextSpan {
                start: m.start(),
                end: m.end(),
            };
            if !claimed(&mentions, &span) {
                mentions.push(EntityMention::pattern(
                    canonical_fault_code(m.as_str()),
                    EntityKind::FaultCode,
                    span,
                ));
            }
        }

        for caps in s.document.captures_iter(text) {
            let (Some(whole), Some(doc)) = (caps.get(0), caps.name("doc")) else {
                continue;
            };
            let has_subject = caps
                .name("subject")
                .is_some_and(|sub| content_tokens(sub.as_str()).next().is_some());
            let full = TextSpan {
                start: whole.start(),
                end: whole.end(),
            };
            let keyword = TextSpan {
                start: doc.start(),
                end: whole.end(),
            };
            let span = if has_subject && !claimed(&mentions, &full) { full } else { keyword };
            if !claimed(&mentions, &span) {
                mentions.push(EntityMention::pattern(&text[span.start..span.end], EntityKind::Document, span));
            }
        }

        mentions.sort_by_key(|m| m.span.map_or(usize::MAX, |s| s.start));
        mentions
    }
}

/// Result of extraction for one query.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Mentions, pattern spans first in text order, then model additions.
    pub mentions: Vec<EntityMention>,
    /// Set when the model capability failed or timed out.
    pub degradation: Option<Degradation>,
}

/// Lane-aware extractor combining patterns with the optional model capability.
#[derive(Clone)]
pub struct EntityExtractor {
    patterns: PatternExtractor,
    model: Option<Arc<dyn ExtractionCapability>>,
    timeout: Duration,
}

impl std::fmt::Debug for EntityExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityExtractor")
            .field("model", &self.model.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EntityExtractor {
    /// Creates an extractor. `model` may be absent.
    #[must_use]
    pub fn new(model: Option<Arc<dyn ExtractionCapability>>, timeout: Duration) -> Self {
        Self {
            patterns: PatternExtractor,
            model,
            timeout,
        }
    }

    /// Extracts mentions from politeness-normalized `text`.
    ///
    /// Blocked queries yield nothing. Spans refer to `text`.
    pub async fn extract(&self, text: &str, lane: Lane, tenant: &TenantId) -> Extraction {
        if lane.is_blocked() {
            return Extraction::default();
        }

        let mut mentions = self.patterns.extract(text);
        debug!(lane = %lane, pattern_mentions = mentions.len(), "pattern extraction complete");

        let Some(model) = self.model.as_ref().filter(|_| lane.permits_model_extraction()) else {
            return Extraction {
                mentions,
                degradation: None,
            };
        };

        let extracted = match tokio::time::timeout(self.timeout, model.extract(text, tenant)).await {
            Ok(Ok(extracted)) => extracted,
            Ok(Err(e)) => {
                warn!(error = %e, "model extraction failed; continuing with pattern mentions");
                return Extraction {
                    mentions,
                    degradation: Some(Degradation::new(DegradedStage::Extraction, e.to_string())),
                };
            }
            Err(_) => {
                let ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms = ms, "model extraction timed out; continuing with pattern mentions");
                return Extraction {
                    mentions,
                    degradation: Some(Degradation::new(
                        DegradedStage::Extraction,
                        format!("timeout after {ms}ms"),
                    )),
                };
            }
        };

        let lowered = text.to_lowercase();
        let mut added = 0usize;
        for candidate in extracted {
            let norm = normalize_phrase(&candidate.text);
            if norm.is_empty() || mentions.iter().any(|m| m.normalized_text() == norm) {
                continue;
            }
            let span = lowered.find(&norm).map(|start| TextSpan {
                start,
                end: start + norm.len(),
            });
            let overlaps_pattern = span.is_some_and(|s| {
                mentions
                    .iter()
                    .filter_map(|m| m.span.as_ref())
                    .any(|p| p.overlaps(&s))
            });
            if overlaps_pattern {
                continue;
            }
            let mut mention = EntityMention::model(candidate.text.trim(), candidate.kind, candidate.confidence);
            mention.span = span;
            mentions.push(mention);
            added += 1;
        }
        debug!(model_mentions = added, "model extraction merged");

        Extraction {
            mentions,
            degradation: None,
        }
    }
}
