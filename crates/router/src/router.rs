use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use tierroute_common::config::{ModelsConfig, RouterConfig};
use tierroute_common::ids::TemplateId;
use tierroute_common::types::{
    MatchMethod, ModelTier, RouteMatch, RouterStats, RoutingDecision, RoutingResult,
    SimilarityLevel, Template, Thresholds,
};
use tierroute_common::{Result, TierRouteError};

use crate::embedder::Embedder;
use crate::embedding::Embedding;
use crate::index::VectorIndex;
use crate::registry::TemplateRegistry;
use crate::tier::{select_tier, ModelCatalog};

/// Synthetic score assigned to keyword-found matches, which carry no real
/// similarity signal.
const KEYWORD_MATCH_SCORE: f64 = 0.5;

/// The background upgrade gets several fast budgets before giving up.
const UPGRADE_BUDGET_FACTOR: u32 = 6;

struct RouterMeta {
    initialized: bool,
    last_refresh: Option<Instant>,
    last_refresh_at: Option<DateTime<Utc>>,
}

/// The dispatch engine: embeds the request, searches the template index,
/// and picks a model tier, degrading to registry keyword search when
/// embeddings are slow or unavailable.
///
/// Every route call produces a well-formed result; degraded conditions show
/// up as `decision` and `embedding_failed`, never as errors.
pub struct SemanticRouter {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    registry: Arc<dyn TemplateRegistry>,
    thresholds: Thresholds,
    catalog: ModelCatalog,
    top_k: usize,
    keyword_limit: usize,
    refresh_period: Duration,
    /// Guards the initialized/last-refresh stamps. std::sync::Mutex, never
    /// held across await points.
    meta: Mutex<RouterMeta>,
    /// Serializes index rebuilds; concurrent refresh attempts coalesce by
    /// failing try_lock.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl SemanticRouter {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        registry: Arc<dyn TemplateRegistry>,
        config: &RouterConfig,
        models: &ModelsConfig,
    ) -> Result<Self> {
        let thresholds = Thresholds::new(
            config.high_threshold,
            config.medium_threshold,
            config.low_threshold,
        )
        .map_err(TierRouteError::Validation)?;

        Ok(Self {
            index: VectorIndex::new(),
            embedder,
            registry,
            thresholds,
            catalog: ModelCatalog::from_config(models),
            top_k: config.top_k,
            keyword_limit: config.keyword_limit,
            refresh_period: Duration::from_secs(config.refresh_seconds),
            meta: Mutex::new(RouterMeta {
                initialized: false,
                last_refresh: None,
                last_refresh_at: None,
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Rebuild the index from the registry's active templates. Templates
    /// without a pre-computed intent embedding are skipped — the authoring
    /// pipeline embeds them before they become routable.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.refresh_gate.lock().await;
        self.rebuild_index().await
    }

    /// Repeat initialization once the refresh period has elapsed. Returns
    /// whether a rebuild ran. Concurrent callers coalesce: whoever holds
    /// the gate rebuilds, everyone else returns immediately.
    pub async fn refresh_if_needed(&self) -> Result<bool> {
        if !self.refresh_due() {
            return Ok(false);
        }
        let Ok(_guard) = self.refresh_gate.try_lock() else {
            return Ok(false);
        };
        // Re-check under the gate: a racing caller may have just rebuilt.
        if !self.refresh_due() {
            return Ok(false);
        }
        self.rebuild_index().await?;
        Ok(true)
    }

    async fn rebuild_index(&self) -> Result<()> {
        let templates = self
            .registry
            .list_active()
            .await
            .map_err(TierRouteError::from)?;

        let total = templates.len();
        let mut entries = Vec::with_capacity(total);
        let mut skipped = 0usize;
        for template in templates {
            // The registry should only hand back active templates; drop
            // anything else rather than routing to a retired intent.
            if !template.is_active() {
                tracing::debug!(
                    template_id = %template.id,
                    status = ?template.status,
                    "Skipping inactive template"
                );
                skipped += 1;
                continue;
            }
            let vector = template.intent_embedding.clone().filter(|v| !v.is_empty());
            match vector {
                Some(v) => entries.push((
                    template.id.to_string(),
                    Embedding::new(v),
                    Arc::new(template),
                )),
                None => {
                    tracing::debug!(
                        template_id = %template.id,
                        "Skipping template without intent embedding"
                    );
                    skipped += 1;
                }
            }
        }

        self.index.replace_all(entries);

        {
            let mut meta = self.meta.lock().unwrap();
            meta.initialized = true;
            meta.last_refresh = Some(Instant::now());
            meta.last_refresh_at = Some(Utc::now());
        }

        tracing::info!(indexed = total - skipped, skipped, "Routing index rebuilt");
        Ok(())
    }

    fn refresh_due(&self) -> bool {
        let meta = self.meta.lock().unwrap();
        match meta.last_refresh {
            Some(at) => at.elapsed() >= self.refresh_period,
            None => true,
        }
    }

    /// Insert or replace a single template in the index. Templates without
    /// a pre-computed embedding are embedded synchronously on the slow
    /// path, which requires the embedder to be up.
    pub async fn add_template(&self, template: Template) -> Result<()> {
        let embedding = match template
            .intent_embedding
            .as_ref()
            .filter(|v| !v.is_empty())
        {
            Some(vector) => Embedding::new(vector.clone()),
            None => {
                if !self.embedder.available() {
                    return Err(TierRouteError::Embedding(
                        "embedder not available".into(),
                    ));
                }
                self.embedder
                    .embed(&template.intent)
                    .await
                    .map_err(TierRouteError::from)?
            }
        };

        let id = template.id.to_string();
        self.index.add(id, &embedding, Arc::new(template));
        Ok(())
    }

    pub fn remove_template(&self, id: &TemplateId) -> bool {
        self.index.remove(&id.to_string())
    }

    pub fn index_size(&self) -> usize {
        self.index.len()
    }

    pub fn embedder_available(&self) -> bool {
        self.embedder.available()
    }

    pub fn stats(&self) -> RouterStats {
        let meta = self.meta.lock().unwrap();
        RouterStats {
            index_size: self.index.len(),
            embedder_available: self.embedder.available(),
            embedding_model: self.embedder.model_name(),
            embedding_dimensions: self.embedder.dimension(),
            last_refresh: meta.last_refresh_at,
            initialized: meta.initialized,
        }
    }

    /// Synchronous routing decision.
    pub async fn route(&self, input: &str) -> RoutingResult {
        let start = Instant::now();

        if !self.embedder.available() {
            return self.fallback_route(input, start).await;
        }

        // Best-effort refresh; a stale index still routes.
        if let Err(e) = self.refresh_if_needed().await {
            tracing::warn!(error = %e, "Index refresh failed, routing against current index");
        }

        match self.embedder.embed_fast(input).await {
            Ok(embedding) => self.decide_from_embedding(embedding, start),
            Err(e) => {
                tracing::info!(error = %e, "Fast-path embedding failed, taking fallback route");
                self.fallback_route(input, start).await
            }
        }
    }

    /// Routing decision that never waits for a slow embedding. When the
    /// fast path succeeds this is exactly `route` with no channel. When it
    /// fails, the keyword fallback result returns immediately and a
    /// detached task retries the embedding on the slow path, delivering at
    /// most one improved decision before closing the channel. The channel
    /// closes without a value on any background failure, and the upgrade is
    /// abandoned if the receiver is dropped.
    pub async fn route_async(
        self: &Arc<Self>,
        input: &str,
    ) -> (RoutingResult, Option<oneshot::Receiver<RoutingResult>>) {
        let start = Instant::now();

        if self.embedder.available() {
            if let Err(e) = self.refresh_if_needed().await {
                tracing::warn!(error = %e, "Index refresh failed, routing against current index");
            }
            match self.embedder.embed_fast(input).await {
                Ok(embedding) => return (self.decide_from_embedding(embedding, start), None),
                Err(e) => {
                    tracing::info!(
                        error = %e,
                        "Fast-path embedding failed, scheduling background upgrade"
                    );
                }
            }
        }

        let initial = self.fallback_route(input, start).await;

        let (mut tx, rx) = oneshot::channel();
        let router = Arc::clone(self);
        let input = input.to_string();
        let budget = self.embedder.fast_timeout() * UPGRADE_BUDGET_FACTOR;

        tokio::spawn(async move {
            let upgrade_start = Instant::now();
            tokio::select! {
                _ = tx.closed() => {
                    tracing::debug!("Routing upgrade abandoned by caller");
                }
                outcome = tokio::time::timeout(budget, router.embedder.embed(&input)) => {
                    match outcome {
                        Ok(Ok(embedding)) => {
                            let improved = router.decide_from_embedding(embedding, upgrade_start);
                            metrics::counter!("router.async_upgrades").increment(1);
                            let _ = tx.send(improved);
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(error = %e, "Background embedding failed, no upgrade");
                        }
                        Err(_) => {
                            tracing::debug!("Background embedding budget elapsed, no upgrade");
                        }
                    }
                }
            }
            // Dropping the sender without sending closes the channel.
        });

        (initial, Some(rx))
    }

    /// Steps 4–7 of the routing procedure: top-K search, threshold
    /// classification, tier selection. Also run by the background upgrade
    /// against the then-current index.
    fn decide_from_embedding(&self, embedding: Embedding, start: Instant) -> RoutingResult {
        let results = self.index.search(&embedding, self.top_k);

        let Some(best) = results.into_iter().next() else {
            return self.build_result(
                RoutingDecision::Novel,
                None,
                ModelTier::Frontier,
                Some(embedding),
                false,
                start,
            );
        };

        if best.score < self.thresholds.low {
            return self.build_result(
                RoutingDecision::Novel,
                None,
                ModelTier::Frontier,
                Some(embedding),
                false,
                start,
            );
        }

        let level = self.thresholds.classify(best.score);
        let tier = select_tier(best.score, best.template.confidence, &self.thresholds);
        let matched = RouteMatch {
            template: (*best.template).clone(),
            similarity: best.score,
            level,
            method: MatchMethod::Embedding,
        };

        self.build_result(
            RoutingDecision::Template,
            Some(matched),
            tier,
            Some(embedding),
            false,
            start,
        )
    }

    /// Routing without embeddings: ask the registry for keyword matches.
    /// A hit upgrades the tentative Fallback decision to Template with a
    /// synthetic low-band score; otherwise the request is treated as novel
    /// so the most capable model still serves it.
    async fn fallback_route(&self, input: &str, start: Instant) -> RoutingResult {
        metrics::counter!("router.fallbacks").increment(1);

        let matches = match self
            .registry
            .search_by_keywords(input, self.keyword_limit)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "Keyword fallback search failed");
                Vec::new()
            }
        };

        match matches.into_iter().next() {
            Some(top) => {
                let matched = RouteMatch {
                    template: top,
                    similarity: KEYWORD_MATCH_SCORE,
                    level: SimilarityLevel::Low,
                    method: MatchMethod::Keyword,
                };
                self.build_result(
                    RoutingDecision::Template,
                    Some(matched),
                    ModelTier::Mid,
                    None,
                    true,
                    start,
                )
            }
            None => self.build_result(
                RoutingDecision::Novel,
                None,
                ModelTier::Frontier,
                None,
                true,
                start,
            ),
        }
    }

    fn build_result(
        &self,
        decision: RoutingDecision,
        matched: Option<RouteMatch>,
        tier: ModelTier,
        input_embedding: Option<Embedding>,
        embedding_failed: bool,
        start: Instant,
    ) -> RoutingResult {
        let decision_label = match decision {
            RoutingDecision::Template => "template",
            RoutingDecision::Novel => "novel",
            RoutingDecision::Fallback => "fallback",
        };
        metrics::counter!("router.decisions", "decision" => decision_label).increment(1);
        metrics::histogram!("router.route.latency").record(start.elapsed().as_secs_f64());

        RoutingResult {
            decision,
            matched,
            recommended_tier: tier,
            recommended_model: self.catalog.model_for(tier).to_string(),
            input_embedding: input_embedding.map(Embedding::into_vec),
            embedding_failed,
            processing_ms: start.elapsed().as_millis() as u64,
        }
    }
}
