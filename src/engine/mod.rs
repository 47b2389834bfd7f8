//! Search orchestration.
//!
//! [`SearchEngine`] wires the pipeline stages together:
//! lane router → extractor → resolver → graph traversal → ranker → action
//! gate → response builder. Each stage consumes the previous stage's output
//! and nothing is shared between requests, so one engine can serve any
//! number of concurrent searches.

mod cancel;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::action::{ActionCatalog, ActionGate, PolicyTable};
use crate::config::EngineConfig;
use crate::entity::CanonicalId;
use crate::error::{Degradation, DegradedStage, ExecutionError, FleetResult, ValidationError};
use crate::extract::EntityExtractor;
use crate::frame::{ResponseBuilder, SearchFrame};
use crate::graph::TraversalEngine;
use crate::intent::{self, Intent};
use crate::lane::{DefaultLaneRouter, LaneRouter};
use crate::query::{Query, TenantId};
use crate::rank::{RankInput, Ranker};
use crate::resolve::{
    AliasStage, CanonicalRuleStage, EntityResolver, GraphLabelStage, ResolvedEntity, ResolverStage, VectorStage,
};
use crate::storage::{
    AliasResolver, DocumentHit, ExtractionCapability, GraphReader, InMemoryStores, RecordSource, RolePolicyStore,
    StructuredRecord, VectorIndex,
};

pub use cancel::CancelToken;

/// The query understanding and action resolution engine.
#[derive(Clone)]
pub struct SearchEngine {
    config: EngineConfig,
    router: Arc<dyn LaneRouter>,
    extractor: EntityExtractor,
    resolver: EntityResolver,
    traversal: TraversalEngine,
    records: Arc<dyn RecordSource>,
    ranker: Ranker,
    gate: ActionGate,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("config", &self.config)
            .field("extractor", &self.extractor)
            .field("resolver", &self.resolver)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl SearchEngine {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> SearchEngineBuilder {
        SearchEngineBuilder::new()
    }

    /// Engine over in-memory collaborators, with vector search enabled.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `config` is invalid.
    pub fn in_memory(stores: &InMemoryStores, config: EngineConfig) -> Result<Self, ValidationError> {
        Self::builder()
            .config(config)
            .aliases(stores.aliases.clone())
            .graph(stores.graph.clone())
            .records(stores.records.clone())
            .vectors(stores.vectors.clone())
            .build()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one search.
    ///
    /// Degraded collaborators never fail the search; they show up in
    /// `metadata.degraded`.
    ///
    /// # Errors
    ///
    /// `ExecutionError::Timeout` if the configured request deadline passes,
    /// `ExecutionError::TaskFailed` if a resolution task panicked.
    pub async fn search(&self, query: &Query) -> FleetResult<SearchFrame> {
        let span = info_span!(
            "search",
            request_id = %query.request_id(),
            tenant = %query.tenant_id(),
            role = %query.role(),
        );
        async {
            match self.config.request_timeout() {
                Some(limit) => match tokio::time::timeout(limit, self.run(query)).await {
                    Ok(result) => result,
                    Err(_) => {
                        let duration_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                        warn!(timeout_ms = duration_ms, "search deadline passed; discarding partial results");
                        Err(ExecutionError::Timeout { duration_ms }.into())
                    }
                },
                None => self.run(query).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Runs one search that stops as soon as `cancel` fires.
    ///
    /// # Errors
    ///
    /// `ExecutionError::Cancelled` on cancellation, otherwise as [`Self::search`].
    pub async fn search_with_cancel(&self, query: &Query, cancel: &CancelToken) -> FleetResult<SearchFrame> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(request_id = %query.request_id(), "search cancelled by caller");
                Err(ExecutionError::Cancelled.into())
            }
            result = self.search(query) => result,
        }
    }

    async fn run(&self, query: &Query) -> FleetResult<SearchFrame> {
        let started = Instant::now();
        let decision = self.router.route(query.text());
        debug!(lane = %decision.lane, reason = %decision.reason, "lane routed");

        if decision.lane.is_blocked() {
            info!(lane = %decision.lane, reason = %decision.reason, "query blocked");
            return Ok(ResponseBuilder::new(query.request_id(), decision, started).build());
        }

        let tenant = query.tenant_id();
        let intent = intent::classify(&decision.normalized_text);
        debug!(intent = %intent, "intent classified");

        let extraction = self
            .extractor
            .extract(&decision.normalized_text, decision.lane, tenant)
            .await;
        let mut degraded: Vec<Degradation> = extraction.degradation.into_iter().collect();

        let resolution = self.resolver.resolve_all(extraction.mentions, tenant).await?;
        degraded.extend(resolution.degradations);

        let mut anchors: Vec<CanonicalId> = Vec::new();
        for id in resolution.entities.iter().filter_map(|e| e.canonical_id.as_ref()) {
            if !anchors.contains(id) {
                anchors.push(id.clone());
            }
        }

        let evidence = self.traversal.traverse(tenant, &anchors, &intent.traversal_plan());
        debug!(anchors = anchors.len(), evidence = evidence.items.len(), "graph traversal complete");
        degraded.extend(evidence.degradations.iter().cloned());

        let (records, documents) = self.fetch_records(tenant, intent, &anchors, &decision.normalized_text, &mut degraded);

        let ranked = self.ranker.rank(&RankInput {
            query_text: &decision.normalized_text,
            intent,
            entities: &resolution.entities,
            evidence: &evidence,
            records: &records,
            documents: &documents,
            now: query.received_at(),
        });

        let gated: Vec<_> = {
            let owners = owners_by_id(&resolution.entities);
            ranked
                .into_iter()
                .map(|item| {
                    let owner = item.anchor.as_ref().and_then(|id| owners.get(id).copied());
                    let actions = self.gate.actions_for(&item, owner, query.role(), decision.lane);
                    (item, actions)
                })
                .collect()
        };

        let lane = decision.lane;
        let mut builder = ResponseBuilder::new(query.request_id(), decision, started)
            .intent(intent)
            .entities(resolution.entities)
            .degraded(degraded);
        for (item, actions) in gated {
            builder = builder.item(item, actions);
        }
        let frame = builder.build();

        info!(
            lane = %lane,
            intent = %intent,
            entities = frame.metadata.entity_count,
            resolved = frame.metadata.resolved_count,
            items = frame.result_items.len(),
            latency_ms = frame.metadata.latency_ms,
            "search complete"
        );
        Ok(frame)
    }

    fn fetch_records(
        &self,
        tenant: &TenantId,
        intent: Intent,
        anchors: &[CanonicalId],
        text: &str,
        degraded: &mut Vec<Degradation>,
    ) -> (Vec<StructuredRecord>, Vec<DocumentHit>) {
        let mut records = Vec::new();
        for anchor in anchors {
            for &kind in intent.record_kinds() {
                match self.records.records(tenant, anchor, kind) {
                    Ok(mut found) => records.append(&mut found),
                    Err(e) => {
                        warn!(entity = %anchor, kind = %kind, error = %e, "record lookup failed");
                        degraded.push(Degradation::new(DegradedStage::Records, e.to_string()));
                    }
                }
            }
        }

        let documents = match self.records.documents(tenant, text, self.config.max_results) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "document search failed");
                degraded.push(Degradation::new(DegradedStage::Records, e.to_string()));
                Vec::new()
            }
        };
        debug!(records = records.len(), documents = documents.len(), "records fetched");
        (records, documents)
    }
}

/// Most confident entity per canonical id.
fn owners_by_id(entities: &[ResolvedEntity]) -> HashMap<&CanonicalId, &ResolvedEntity> {
    let mut owners: HashMap<&CanonicalId, &ResolvedEntity> = HashMap::new();
    for entity in entities {
        let Some(id) = entity.canonical_id.as_ref() else {
            continue;
        };
        match owners.get(id) {
            Some(existing) if existing.confidence.total() >= entity.confidence.total() => {}
            _ => {
                owners.insert(id, entity);
            }
        }
    }
    owners
}

/// Builder for [`SearchEngine`].
///
/// Alias, graph and record collaborators are required. Vector search and
/// model extraction are optional; without them the corresponding stage is
/// skipped. The policy defaults to the config's rows, or the built-in table.
#[derive(Default)]
pub struct SearchEngineBuilder {
    config: EngineConfig,
    router: Option<Arc<dyn LaneRouter>>,
    aliases: Option<Arc<dyn AliasResolver>>,
    graph: Option<Arc<dyn GraphReader>>,
    records: Option<Arc<dyn RecordSource>>,
    vectors: Option<Arc<dyn VectorIndex>>,
    extraction: Option<Arc<dyn ExtractionCapability>>,
    policy: Option<Arc<dyn RolePolicyStore>>,
    catalog: Option<ActionCatalog>,
}

impl std::fmt::Debug for SearchEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngineBuilder")
            .field("config", &self.config)
            .field("vectors", &self.vectors.is_some())
            .field("extraction", &self.extraction.is_some())
            .finish_non_exhaustive()
    }
}

impl SearchEngineBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default lane router.
    #[must_use]
    pub fn router(mut self, router: Arc<dyn LaneRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Sets the alias table.
    #[must_use]
    pub fn aliases(mut self, aliases: Arc<dyn AliasResolver>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// Sets the graph reader.
    #[must_use]
    pub fn graph(mut self, graph: Arc<dyn GraphReader>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Sets the record and document source.
    #[must_use]
    pub fn records(mut self, records: Arc<dyn RecordSource>) -> Self {
        self.records = Some(records);
        self
    }

    /// Enables the vector-similarity stage.
    #[must_use]
    pub fn vectors(mut self, vectors: Arc<dyn VectorIndex>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    /// Enables model extraction for the model lanes.
    #[must_use]
    pub fn extraction(mut self, extraction: Arc<dyn ExtractionCapability>) -> Self {
        self.extraction = Some(extraction);
        self
    }

    /// Replaces the role policy.
    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn RolePolicyStore>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Replaces the built-in action catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: ActionCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if:
    /// - the configuration is invalid
    /// - a required collaborator is missing
    /// - a policy row names an action absent from the catalog
    pub fn build(self) -> Result<SearchEngine, ValidationError> {
        let config = self.config;
        config.validate()?;

        let aliases = self.aliases.ok_or_else(|| missing("aliases"))?;
        let graph = self.graph.ok_or_else(|| missing("graph"))?;
        let records = self.records.ok_or_else(|| missing("records"))?;

        let catalog = Arc::new(self.catalog.unwrap_or_default());
        let policy: Arc<dyn RolePolicyStore> = match self.policy {
            Some(policy) => policy,
            None => match config.policy.clone() {
                Some(rules) => Arc::new(PolicyTable::new(rules, &catalog)?),
                None => Arc::new(PolicyTable::fleet_default(&catalog)?),
            },
        };

        let mut stages: Vec<Arc<dyn ResolverStage>> = vec![
            Arc::new(CanonicalRuleStage),
            Arc::new(AliasStage::new(aliases)),
            Arc::new(GraphLabelStage::new(graph.clone(), config.min_label_similarity)),
        ];
        if let Some(vectors) = self.vectors {
            stages.push(Arc::new(VectorStage::new(
                vectors,
                graph.clone(),
                config.embedding_timeout(),
                config.vector_k,
                config.min_vector_similarity,
            )));
        }

        Ok(SearchEngine {
            router: self
                .router
                .unwrap_or_else(|| Arc::new(DefaultLaneRouter::new(config.max_query_chars))),
            extractor: EntityExtractor::new(self.extraction, config.extraction_timeout()),
            resolver: EntityResolver::new(stages, config.resolution_weights, config.resolution_timeout()),
            traversal: TraversalEngine::new(graph),
            records,
            ranker: Ranker::new(config.rank_weights, config.thresholds, config.max_results),
            gate: ActionGate::new(catalog, policy, config.thresholds),
            config,
        })
    }
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingField {
        field: field.to_string(),
    }
}
