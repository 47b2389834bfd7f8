//! The four resolution strategies.
//!
//! Each stage is independent and testable alone. A stage reports a score,
//! optionally a canonical id, and optionally a degradation when its
//! collaborator failed; it never returns an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::confidence::ResolutionStage;
use crate::embedding::lexical_embedding;
use crate::entity::{normalize_phrase, CanonicalId, EntityKind, EntityMention};
use crate::error::{Degradation, DegradedStage};
use crate::extract::canonical_fault_code;
use crate::query::TenantId;
use crate::storage::{AliasResolver, GraphReader, VectorIndex};
use crate::vocabulary::Vocabulary;

/// Minimum Jaro-Winkler similarity for a fuzzy dictionary hit in stage 1.
pub const FUZZY_DICTIONARY_SIMILARITY: f64 = 0.88;

/// Alias score when the canonical token hits.
const ALIAS_TOKEN_SCORE: f32 = 1.0;
/// Alias score when only the raw mention text hits.
const ALIAS_TEXT_SCORE: f32 = 0.9;
/// Floor applied to substring label matches in stage 3.
const LABEL_SUBSTRING_SCORE: f64 = 0.85;

/// Per-mention state shared by the stages of one cascade.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Tenant scope of every lookup.
    pub tenant: TenantId,
    /// Canonical token established by stage 1, if any.
    pub canonical_token: Option<String>,
}

/// What a stage produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    /// Raw score in [0, 1]; 0 when the stage found nothing.
    pub score: f32,
    /// Resolved storage id. Ends the cascade.
    pub canonical_id: Option<CanonicalId>,
    /// Canonical token (stage 1 only).
    pub canonical_token: Option<String>,
    /// Set when the collaborator failed.
    pub degradation: Option<Degradation>,
}

impl StageOutcome {
    /// Nothing found.
    #[must_use]
    pub fn miss() -> Self {
        Self::default()
    }

    fn resolved(score: f32, id: CanonicalId) -> Self {
        Self {
            score,
            canonical_id: Some(id),
            ..Self::default()
        }
    }

    fn degraded(stage: DegradedStage, reason: impl Into<String>) -> Self {
        Self {
            degradation: Some(Degradation::new(stage, reason)),
            ..Self::default()
        }
    }
}

/// One strategy of the resolution cascade.
#[async_trait]
pub trait ResolverStage: Send + Sync {
    /// Which weighted component this stage fills.
    fn stage(&self) -> ResolutionStage;

    /// Attempts to resolve `mention`.
    async fn attempt(&self, mention: &EntityMention, ctx: &StageContext) -> StageOutcome;
}

fn needles(mention: &EntityMention, ctx: &StageContext) -> Vec<String> {
    let mut out = vec![mention.normalized_text()];
    if let Some(token) = &ctx.canonical_token {
        let t = normalize_phrase(&token.replace('_', " "));
        if !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

#[allow(clippy::cast_possible_truncation)]
fn to_score(sim: f64) -> f32 {
    sim.clamp(0.0, 1.0) as f32
}

/// Stage 1: dictionary and shape rules. Yields a canonical token, never an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalRuleStage;

#[async_trait]
impl ResolverStage for CanonicalRuleStage {
    fn stage(&self) -> ResolutionStage {
        ResolutionStage::CanonicalRule
    }

    async fn attempt(&self, mention: &EntityMention, _ctx: &StageContext) -> StageOutcome {
        match mention.kind {
            EntityKind::FaultCode => {
                let code = canonical_fault_code(&mention.text);
                if code.is_empty() {
                    return StageOutcome::miss();
                }
                StageOutcome {
                    score: 1.0,
                    canonical_token: Some(code),
                    ..StageOutcome::default()
                }
            }
            EntityKind::Document => StageOutcome::miss(),
            kind => {
                let vocab = Vocabulary::builtin();
                if let Some(entry) = vocab.lookup(&mention.text).filter(|e| e.kind == kind) {
                    return StageOutcome {
                        score: 1.0,
                        canonical_token: Some(entry.token.to_string()),
                        ..StageOutcome::default()
                    };
                }
                vocab
                    .fuzzy_lookup(&mention.text, kind, FUZZY_DICTIONARY_SIMILARITY)
                    .map_or_else(StageOutcome::miss, |(entry, sim)| StageOutcome {
                        score: to_score(sim),
                        canonical_token: Some(entry.token.to_string()),
                        ..StageOutcome::default()
                    })
            }
        }
    }
}

/// Stage 2: tenant alias table, canonical token first, then raw text.
#[derive(Clone)]
pub struct AliasStage {
    aliases: Arc<dyn AliasResolver>,
}

impl AliasStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(aliases: Arc<dyn AliasResolver>) -> Self {
        Self { aliases }
    }
}

#[async_trait]
impl ResolverStage for AliasStage {
    fn stage(&self) -> ResolutionStage {
        ResolutionStage::AliasTable
    }

    async fn attempt(&self, mention: &EntityMention, ctx: &StageContext) -> StageOutcome {
        let mut lookups: Vec<(&str, f32)> = Vec::with_capacity(2);
        if let Some(token) = ctx.canonical_token.as_deref() {
            lookups.push((token, ALIAS_TOKEN_SCORE));
        }
        lookups.push((mention.text.as_str(), ALIAS_TEXT_SCORE));

        for (key, score) in lookups {
            match self.aliases.resolve(&ctx.tenant, mention.kind, key) {
                Ok(Some(id)) => return StageOutcome::resolved(score, id),
                Ok(None) => {}
                Err(e) => {
                    warn!(mention = %mention.text, error = %e, "alias lookup failed");
                    return StageOutcome::degraded(DegradedStage::Alias, e.to_string());
                }
            }
        }
        StageOutcome::miss()
    }
}

/// Stage 3: fuzzy match against graph node labels of the mention's kind.
#[derive(Clone)]
pub struct GraphLabelStage {
    graph: Arc<dyn GraphReader>,
    min_similarity: f32,
}

impl GraphLabelStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(graph: Arc<dyn GraphReader>, min_similarity: f32) -> Self {
        Self { graph, min_similarity }
    }
}

fn label_similarity(label: &str, needle: &str) -> f64 {
    let sim = strsim::jaro_winkler(label, needle);
    if label.contains(needle) || needle.contains(label) {
        sim.max(LABEL_SUBSTRING_SCORE)
    } else {
        sim
    }
}

#[async_trait]
impl ResolverStage for GraphLabelStage {
    fn stage(&self) -> ResolutionStage {
        ResolutionStage::GraphLabel
    }

    async fn attempt(&self, mention: &EntityMention, ctx: &StageContext) -> StageOutcome {
        let needles = needles(mention, ctx);
        let mut best: Option<(f64, CanonicalId)> = None;

        for needle in &needles {
            let candidates = match self.graph.nodes_by_label(&ctx.tenant, mention.kind, needle) {
                Ok(c) => c,
                Err(e) => {
                    warn!(mention = %mention.text, error = %e, "graph label lookup failed");
                    return StageOutcome::degraded(DegradedStage::Graph, e.to_string());
                }
            };
            for node in candidates {
                let sim = label_similarity(&normalize_phrase(&node.label), needle);
                let better = match &best {
                    None => true,
                    Some((b, id)) => sim > *b || (sim == *b && node.id < *id),
                };
                if better {
                    best = Some((sim, node.id));
                }
            }
        }

        match best {
            Some((sim, id)) if to_score(sim) >= self.min_similarity => StageOutcome::resolved(to_score(sim), id),
            _ => StageOutcome::miss(),
        }
    }
}

/// Stage 4: nearest neighbour over the tenant's entity embeddings.
///
/// Hits whose graph node has a different kind than the mention are skipped;
/// hits with no graph node are kept.
#[derive(Clone)]
pub struct VectorStage {
    index: Arc<dyn VectorIndex>,
    graph: Arc<dyn GraphReader>,
    timeout: Duration,
    k: usize,
    min_similarity: f32,
}

impl VectorStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        index: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphReader>,
        timeout: Duration,
        k: usize,
        min_similarity: f32,
    ) -> Self {
        Self {
            index,
            graph,
            timeout,
            k,
            min_similarity,
        }
    }

    fn kind_matches(&self, mention: &EntityMention, ctx: &StageContext, id: &CanonicalId) -> bool {
        match self.graph.node(&ctx.tenant, id) {
            Ok(Some(node)) => node.kind == mention.kind,
            Ok(None) => true,
            Err(e) => {
                warn!(mention = %mention.text, id = %id, error = %e, "node kind lookup failed");
                true
            }
        }
    }
}

#[async_trait]
impl ResolverStage for VectorStage {
    fn stage(&self) -> ResolutionStage {
        ResolutionStage::VectorSimilarity
    }

    async fn attempt(&self, mention: &EntityMention, ctx: &StageContext) -> StageOutcome {
        let embedding = lexical_embedding(&needles(mention, ctx).join(" "));
        let hits = match tokio::time::timeout(self.timeout, self.index.nearest(&ctx.tenant, &embedding, self.k)).await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(mention = %mention.text, error = %e, "vector lookup failed");
                return StageOutcome::degraded(DegradedStage::Embedding, e.to_string());
            }
            Err(_) => {
                let ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(mention = %mention.text, timeout_ms = ms, "vector lookup timed out");
                return StageOutcome::degraded(DegradedStage::Embedding, format!("timeout after {ms}ms"));
            }
        };

        let mut hits: Vec<_> = hits
            .into_iter()
            .filter(|(_, s)| s.is_finite() && *s >= self.min_similarity)
            .collect();
        hits.sort_by(|(ia, sa), (ib, sb)| sb.total_cmp(sa).then_with(|| ia.cmp(ib)));

        hits.into_iter()
            .find(|(id, _)| self.kind_matches(mention, ctx, id))
            .map_or_else(StageOutcome::miss, |(id, s)| StageOutcome::resolved(s.min(1.0), id))
    }
}
