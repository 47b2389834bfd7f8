//! Entity resolution cascade.
//!
//! Every mention runs through an ordered list of [`ResolverStage`]s until one
//! yields a canonical id. Stages for one mention run strictly in sequence;
//! different mentions resolve concurrently, one task each, joined under a
//! bounded timeout and reassembled in mention order.
//!
//! A mention nothing resolves is kept with `canonical_id = None` and zero
//! confidence: callers can still show what was detected.

/// Individual resolution strategies.
pub mod stages;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::confidence::{ConfidenceScore, ConfidenceThresholds, ResolutionStage, ResolutionWeights, StageScores};
use crate::entity::{CanonicalId, EntityMention};
use crate::error::{Degradation, DegradedStage, ExecutionError, FleetResult};
use crate::query::TenantId;

pub use stages::{
    AliasStage, CanonicalRuleStage, GraphLabelStage, ResolverStage, StageContext, StageOutcome, VectorStage,
};

/// A mention after resolution. Always present, resolved or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    /// The original mention.
    pub mention: EntityMention,

    /// Storage id, if any stage found one.
    pub canonical_id: Option<CanonicalId>,

    /// Dictionary token from stage 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_token: Option<String>,

    /// Weighted confidence with per-stage breakdown.
    pub confidence: ConfidenceScore,

    /// Stage that produced `canonical_id`.
    pub resolved_by: Option<ResolutionStage>,
}

impl ResolvedEntity {
    /// An entity no stage resolved.
    #[must_use]
    pub fn unresolved(mention: EntityMention) -> Self {
        Self {
            mention,
            canonical_id: None,
            canonical_token: None,
            confidence: ConfidenceScore::zero(),
            resolved_by: None,
        }
    }

    /// Returns true if a canonical id was found.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.canonical_id.is_some()
    }

    /// Resolved and above the "confident" line.
    #[must_use]
    pub fn is_confident(&self, thresholds: &ConfidenceThresholds) -> bool {
        self.is_resolved() && self.confidence.is_confident(thresholds)
    }
}

/// Resolution output for one query.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// One entry per mention, in mention order.
    pub entities: Vec<ResolvedEntity>,
    /// Collaborator failures absorbed along the way.
    pub degradations: Vec<Degradation>,
}

/// Runs the cascade.
#[derive(Clone)]
pub struct EntityResolver {
    stages: Arc<[Arc<dyn ResolverStage>]>,
    weights: ResolutionWeights,
    fanout_timeout: Duration,
}

impl std::fmt::Debug for EntityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityResolver")
            .field("stages", &self.stages.iter().map(|s| s.stage()).collect::<Vec<_>>())
            .field("weights", &self.weights)
            .field("fanout_timeout", &self.fanout_timeout)
            .finish()
    }
}

impl EntityResolver {
    /// Creates a resolver over `stages`, tried in the given order.
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn ResolverStage>>, weights: ResolutionWeights, fanout_timeout: Duration) -> Self {
        Self {
            stages: stages.into(),
            weights,
            fanout_timeout,
        }
    }

    /// Resolves one mention.
    pub async fn resolve_one(&self, mention: EntityMention, tenant: &TenantId) -> (ResolvedEntity, Vec<Degradation>) {
        let mut ctx = StageContext {
            tenant: tenant.clone(),
            canonical_token: None,
        };
        let mut scores = StageScores::default();
        let mut degradations = Vec::new();
        let mut resolved: Option<(CanonicalId, ResolutionStage)> = None;

        for stage in self.stages.iter() {
            let outcome = stage.attempt(&mention, &ctx).await;
            if let Some(d) = outcome.degradation {
                degradations.push(d);
            }
            if outcome.canonical_token.is_some() && ctx.canonical_token.is_none() {
                ctx.canonical_token = outcome.canonical_token;
            }
            // Stages after the first only count when they produced the id.
            if stage.stage() == ResolutionStage::CanonicalRule || outcome.canonical_id.is_some() {
                scores.record(stage.stage(), outcome.score);
            }
            if let Some(id) = outcome.canonical_id {
                resolved = Some((id, stage.stage()));
                break;
            }
        }

        let (canonical_id, resolved_by) = match resolved {
            Some((id, stage)) => (Some(id), Some(stage)),
            None => (None, None),
        };
        // Unresolved entities report zero regardless of what stage 1 saw.
        let confidence = if canonical_id.is_some() {
            ConfidenceScore::weigh(scores, &self.weights)
        } else {
            ConfidenceScore::zero()
        };
        debug!(
            mention = %mention.text,
            canonical_id = ?canonical_id,
            resolved_by = ?resolved_by,
            confidence = confidence.total(),
            "mention resolved"
        );

        let entity = ResolvedEntity {
            mention,
            canonical_id,
            canonical_token: ctx.canonical_token,
            confidence,
            resolved_by,
        };
        (entity, degradations)
    }

    /// Resolves all mentions concurrently, preserving order.
    ///
    /// Mentions still running when the fan-out deadline passes are kept
    /// unresolved and reported as a degradation. A panicked task is a
    /// programmer error and fails the request.
    pub async fn resolve_all(&self, mentions: Vec<EntityMention>, tenant: &TenantId) -> FleetResult<Resolution> {
        let mut slots: Vec<Option<(ResolvedEntity, Vec<Degradation>)>> = vec![None; mentions.len()];
        let mut set = JoinSet::new();

        for (idx, mention) in mentions.iter().cloned().enumerate() {
            let resolver = self.clone();
            let tenant = tenant.clone();
            set.spawn(async move { (idx, resolver.resolve_one(mention, &tenant).await) });
        }

        let joined = tokio::time::timeout(self.fanout_timeout, async {
            while let Some(res) = set.join_next().await {
                match res {
                    Ok((idx, out)) => {
                        if let Some(slot) = slots.get_mut(idx) {
                            *slot = Some(out);
                        }
                    }
                    Err(e) => {
                        return Err(ExecutionError::TaskFailed {
                            message: e.to_string(),
                        });
                    }
                }
            }
            Ok(())
        })
        .await;

        let mut resolution = Resolution::default();
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                set.abort_all();
                let ms = u64::try_from(self.fanout_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms = ms, "resolution fan-out deadline passed; keeping unfinished mentions unresolved");
                resolution
                    .degradations
                    .push(Degradation::new(DegradedStage::Resolution, format!("timeout after {ms}ms")));
            }
        }

        for (slot, mention) in slots.into_iter().zip(mentions) {
            match slot {
                Some((entity, mut degradations)) => {
                    resolution.entities.push(entity);
                    resolution.degradations.append(&mut degradations);
                }
                None => resolution.entities.push(ResolvedEntity::unresolved(mention)),
            }
        }
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityKind, TextSpan};
    use crate::storage::InMemoryAliasTable;
    use async_trait::async_trait;

    fn mention(text: &str, kind: EntityKind) -> EntityMention {
        EntityMention::pattern(text, kind, TextSpan { start: 0, end: text.len() })
    }

    fn tenant() -> TenantId {
        TenantId::new("yacht-1")
    }

    fn resolver_with_alias() -> EntityResolver {
        let table = InMemoryAliasTable::new();
        table.insert(&tenant(), EntityKind::Equipment, "generator", "GEN_1").unwrap();
        EntityResolver::new(
            vec![Arc::new(CanonicalRuleStage), Arc::new(AliasStage::new(Arc::new(table)))],
            ResolutionWeights::default(),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn rule_plus_alias_scores_seventy() {
        let (entity, degradations) = resolver_with_alias()
            .resolve_one(mention("genset", EntityKind::Equipment), &tenant())
            .await;
        assert_eq!(entity.canonical_id, Some(CanonicalId::new("GEN_1")));
        assert_eq!(entity.resolved_by, Some(ResolutionStage::AliasTable));
        assert!((entity.confidence.total() - 0.70).abs() < 1e-6);
        assert!(degradations.is_empty());
    }

    #[tokio::test]
    async fn unresolved_mentions_are_kept_in_order() {
        let out = resolver_with_alias()
            .resolve_all(
                vec![
                    mention("watermaker", EntityKind::Equipment),
                    mention("generator", EntityKind::Equipment),
                ],
                &tenant(),
            )
            .await
            .unwrap();
        assert_eq!(out.entities.len(), 2);
        assert_eq!(out.entities[0].mention.text, "watermaker");
        assert!(!out.entities[0].is_resolved());
        assert_eq!(out.entities[0].confidence.total(), 0.0);
        assert_eq!(out.entities[0].canonical_token.as_deref(), Some("WATERMAKER"));
        assert!(out.entities[1].is_resolved());
    }

    struct Stuck;

    #[async_trait]
    impl ResolverStage for Stuck {
        fn stage(&self) -> ResolutionStage {
            ResolutionStage::VectorSimilarity
        }

        async fn attempt(&self, _mention: &EntityMention, _ctx: &StageContext) -> StageOutcome {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fanout_deadline_keeps_mentions_unresolved() {
        let resolver = EntityResolver::new(
            vec![Arc::new(CanonicalRuleStage), Arc::new(Stuck)],
            ResolutionWeights::default(),
            Duration::from_millis(50),
        );
        let out = resolver
            .resolve_all(vec![mention("generator", EntityKind::Equipment)], &tenant())
            .await
            .unwrap();
        assert_eq!(out.entities.len(), 1);
        assert!(!out.entities[0].is_resolved());
        assert_eq!(out.degradations[0].stage, DegradedStage::Resolution);
    }

    struct Panics;

    #[async_trait]
    impl ResolverStage for Panics {
        fn stage(&self) -> ResolutionStage {
            ResolutionStage::CanonicalRule
        }

        async fn attempt(&self, _mention: &EntityMention, _ctx: &StageContext) -> StageOutcome {
            panic!("stage defect")
        }
    }

    #[tokio::test]
    async fn panicked_stage_fails_the_request() {
        let resolver = EntityResolver::new(vec![Arc::new(Panics)], ResolutionWeights::default(), Duration::from_secs(1));
        let err = resolver
            .resolve_all(vec![mention("generator", EntityKind::Equipment)], &tenant())
            .await
            .unwrap_err();
        assert!(err.is_execution());
    }
}
