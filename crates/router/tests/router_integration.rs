//! End-to-end routing scenarios against a canned-vector embedder and an
//! in-memory registry. Everything here is hermetic; no live services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tierroute_common::config::{ModelsConfig, RouterConfig};
use tierroute_common::types::{
    MatchMethod, ModelTier, RoutingDecision, SimilarityLevel, Template, TemplateStatus,
};

use tierroute_router::backend::EmbeddingError;
use tierroute_router::embedder::{EmbedBatchFuture, EmbedFuture, Embedder};
use tierroute_router::embedding::Embedding;
use tierroute_router::registry::{RegistryError, RegistryFuture, TemplateRegistry};
use tierroute_router::router::SemanticRouter;

// -----------------------------------------------------------------------
// Test doubles
// -----------------------------------------------------------------------

/// Embedder returning canned unit vectors per input text.
struct CannedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    up: AtomicBool,
    fast_fails: AtomicBool,
    slow_fails: AtomicBool,
    slow_calls: AtomicUsize,
}

impl CannedEmbedder {
    fn new(vectors: &[(&str, Vec<f32>)]) -> Arc<Self> {
        Arc::new(Self {
            vectors: vectors
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            up: AtomicBool::new(true),
            fast_fails: AtomicBool::new(false),
            slow_fails: AtomicBool::new(false),
            slow_calls: AtomicUsize::new(0),
        })
    }

    fn lookup(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.vectors
            .get(text)
            .map(|v| Embedding::new(v.clone()))
            .ok_or_else(|| EmbeddingError::Api(format!("no canned vector for {:?}", text)))
    }
}

impl Embedder for CannedEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move {
            self.slow_calls.fetch_add(1, Ordering::SeqCst);
            if self.slow_fails.load(Ordering::SeqCst) {
                return Err(EmbeddingError::Api("500: backend down".into()));
            }
            self.lookup(text)
        })
    }

    fn embed_fast<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move {
            if self.fast_fails.load(Ordering::SeqCst) {
                return Err(EmbeddingError::Timeout);
            }
            self.lookup(text)
        })
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedBatchFuture<'a> {
        Box::pin(async move { texts.iter().map(|t| self.lookup(t)).collect() })
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> String {
        "canned-test-model".into()
    }

    fn available(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    fn fast_timeout(&self) -> Duration {
        Duration::from_millis(50)
    }
}

/// In-memory registry with scripted active templates and keyword results.
struct FakeRegistry {
    active: Vec<Template>,
    keyword_hits: Vec<Template>,
    fail_keywords: AtomicBool,
    list_calls: AtomicUsize,
}

impl FakeRegistry {
    fn new(active: Vec<Template>, keyword_hits: Vec<Template>) -> Arc<Self> {
        Arc::new(Self {
            active,
            keyword_hits,
            fail_keywords: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        })
    }
}

impl TemplateRegistry for FakeRegistry {
    fn list_active<'a>(&'a self) -> RegistryFuture<'a, Vec<Template>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.active.clone())
        })
    }

    fn search_by_keywords<'a>(
        &'a self,
        _query: &'a str,
        limit: usize,
    ) -> RegistryFuture<'a, Vec<Template>> {
        Box::pin(async move {
            if self.fail_keywords.load(Ordering::SeqCst) {
                return Err(RegistryError::Http("connection refused".into()));
            }
            Ok(self.keyword_hits.iter().take(limit).cloned().collect())
        })
    }
}

// -----------------------------------------------------------------------
// Setup helpers
// -----------------------------------------------------------------------

fn active_template(intent: &str, confidence: f64, embedding: Option<Vec<f32>>) -> Template {
    let mut t = Template::new(intent.into(), confidence);
    t.status = TemplateStatus::Promoted;
    t.intent_embedding = embedding;
    t
}

fn test_models() -> ModelsConfig {
    ModelsConfig {
        local: "local-model".into(),
        mid: "mid-model".into(),
        advanced: "advanced-model".into(),
        frontier: "frontier-model".into(),
    }
}

fn build_router(
    embedder: Arc<CannedEmbedder>,
    registry: Arc<FakeRegistry>,
) -> Arc<SemanticRouter> {
    Arc::new(
        SemanticRouter::new(
            embedder,
            registry,
            &RouterConfig::default(),
            &test_models(),
        )
        .expect("router construction"),
    )
}

/// One promoted template with intent "fix authentication bug", confidence
/// 0.9, intent vector along the x axis.
async fn setup_single_template(
    input_vector: Vec<f32>,
    input: &str,
) -> (Arc<SemanticRouter>, Arc<CannedEmbedder>) {
    let template = active_template("fix authentication bug", 0.9, Some(vec![1.0, 0.0, 0.0]));
    let embedder = CannedEmbedder::new(&[(input, input_vector)]);
    let registry = FakeRegistry::new(vec![template], Vec::new());
    let router = build_router(embedder.clone(), registry);
    router.initialize().await.expect("initialize");
    (router, embedder)
}

// -----------------------------------------------------------------------
// 1. Threshold scenarios
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_exact_match_routes_local() {
    let input = "fix authentication bug";
    let (router, _) = setup_single_template(vec![1.0, 0.0, 0.0], input).await;

    let result = router.route(input).await;

    assert_eq!(result.decision, RoutingDecision::Template);
    let matched = result.matched.expect("match populated");
    assert_eq!(matched.template.intent, "fix authentication bug");
    assert!((matched.similarity - 1.0).abs() < 1e-5);
    assert_eq!(matched.level, SimilarityLevel::High);
    assert_eq!(matched.method, MatchMethod::Embedding);
    assert_eq!(result.recommended_tier, ModelTier::Local);
    assert_eq!(result.recommended_model, "local-model");
    assert!(!result.embedding_failed);
    assert!(result.input_embedding.is_some());
}

#[tokio::test]
async fn test_moderate_match_routes_mid() {
    // cos = 0.72 against the template's x-axis vector.
    let y = (1.0_f32 - 0.72 * 0.72).sqrt();
    let input = "repair the login flow";
    let (router, _) = setup_single_template(vec![0.72, y, 0.0], input).await;

    let result = router.route(input).await;

    assert_eq!(result.decision, RoutingDecision::Template);
    let matched = result.matched.expect("match populated");
    assert_eq!(matched.level, SimilarityLevel::Medium);
    assert_eq!(result.recommended_tier, ModelTier::Mid);
    assert_eq!(result.recommended_model, "mid-model");
}

#[tokio::test]
async fn test_low_match_routes_advanced() {
    let y = (1.0_f32 - 0.55 * 0.55).sqrt();
    let input = "something about auth maybe";
    let (router, _) = setup_single_template(vec![0.55, y, 0.0], input).await;

    let result = router.route(input).await;

    assert_eq!(result.decision, RoutingDecision::Template);
    let matched = result.matched.expect("match populated");
    assert_eq!(matched.level, SimilarityLevel::Low);
    assert_eq!(result.recommended_tier, ModelTier::Advanced);
}

#[tokio::test]
async fn test_below_low_routes_novel_frontier() {
    let y = (1.0_f32 - 0.30 * 0.30).sqrt();
    let input = "compose a haiku about distributed consensus";
    let (router, _) = setup_single_template(vec![0.30, y, 0.0], input).await;

    let result = router.route(input).await;

    assert_eq!(result.decision, RoutingDecision::Novel);
    assert!(result.matched.is_none());
    assert_eq!(result.recommended_tier, ModelTier::Frontier);
    assert_eq!(result.recommended_model, "frontier-model");
    assert!(!result.embedding_failed);
    // The embedding is kept so the frontier answer can be distilled.
    assert!(result.input_embedding.is_some());
}

// -----------------------------------------------------------------------
// 2. Degraded paths
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_fast_timeout_with_keyword_hit_upgrades_to_template() {
    let t2 = active_template("rotate expired credentials", 0.8, Some(vec![0.0, 1.0, 0.0]));
    let embedder = CannedEmbedder::new(&[]);
    embedder.fast_fails.store(true, Ordering::SeqCst);
    let registry = FakeRegistry::new(vec![t2.clone()], vec![t2]);
    let router = build_router(embedder, registry);
    router.initialize().await.unwrap();

    let result = router.route("rotate credentials please").await;

    assert_eq!(result.decision, RoutingDecision::Template);
    let matched = result.matched.expect("keyword match populated");
    assert_eq!(matched.template.intent, "rotate expired credentials");
    assert_eq!(matched.similarity, 0.5);
    assert_eq!(matched.level, SimilarityLevel::Low);
    assert_eq!(matched.method, MatchMethod::Keyword);
    assert_eq!(result.recommended_tier, ModelTier::Mid);
    assert!(result.embedding_failed);
}

#[tokio::test]
async fn test_embedder_down_and_no_keywords_routes_frontier() {
    let embedder = CannedEmbedder::new(&[]);
    embedder.up.store(false, Ordering::SeqCst);
    let registry = FakeRegistry::new(Vec::new(), Vec::new());
    let router = build_router(embedder, registry);
    router.initialize().await.unwrap();

    let result = router.route("anything at all").await;

    assert_eq!(result.decision, RoutingDecision::Novel);
    assert!(result.matched.is_none());
    assert_eq!(result.recommended_tier, ModelTier::Frontier);
    assert!(result.embedding_failed);
    assert!(result.input_embedding.is_none());
}

#[tokio::test]
async fn test_registry_error_during_fallback_still_yields_result() {
    let embedder = CannedEmbedder::new(&[]);
    embedder.up.store(false, Ordering::SeqCst);
    let registry = FakeRegistry::new(Vec::new(), Vec::new());
    registry.fail_keywords.store(true, Ordering::SeqCst);
    let router = build_router(embedder, registry);
    router.initialize().await.unwrap();

    let result = router.route("anything").await;

    assert_eq!(result.decision, RoutingDecision::Novel);
    assert_eq!(result.recommended_tier, ModelTier::Frontier);
    assert!(result.embedding_failed);
}

#[tokio::test]
async fn test_empty_index_with_successful_embedding_routes_novel() {
    let input = "brand new request";
    let embedder = CannedEmbedder::new(&[(input, vec![1.0, 0.0, 0.0])]);
    let registry = FakeRegistry::new(Vec::new(), Vec::new());
    let router = build_router(embedder, registry);
    router.initialize().await.unwrap();

    let result = router.route(input).await;

    assert_eq!(result.decision, RoutingDecision::Novel);
    assert_eq!(result.recommended_tier, ModelTier::Frontier);
    assert!(!result.embedding_failed);
}

// -----------------------------------------------------------------------
// 3. Async routing contract
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_route_async_fast_success_has_no_channel() {
    let input = "fix authentication bug";
    let (router, _) = setup_single_template(vec![1.0, 0.0, 0.0], input).await;

    let (initial, improvement) = router.route_async(input).await;

    assert_eq!(initial.decision, RoutingDecision::Template);
    assert!(improvement.is_none());
}

#[tokio::test]
async fn test_route_async_delivers_one_upgrade() {
    let input = "fix authentication bug";
    let template = active_template("fix authentication bug", 0.9, Some(vec![1.0, 0.0, 0.0]));
    let embedder = CannedEmbedder::new(&[(input, vec![1.0, 0.0, 0.0])]);
    // Fast path times out; slow path succeeds.
    embedder.fast_fails.store(true, Ordering::SeqCst);
    let registry = FakeRegistry::new(vec![template.clone()], vec![template]);
    let router = build_router(embedder.clone(), registry);
    router.initialize().await.unwrap();

    let (initial, improvement) = router.route_async(input).await;

    // Initial result is the keyword fallback.
    assert_eq!(initial.decision, RoutingDecision::Template);
    assert!(initial.embedding_failed);
    assert_eq!(
        initial.matched.as_ref().map(|m| m.method),
        Some(MatchMethod::Keyword)
    );

    // The upgrade arrives on the channel, re-scored from the embedding.
    let improved = improvement
        .expect("improvement channel present")
        .await
        .expect("one upgrade delivered");
    assert_eq!(improved.decision, RoutingDecision::Template);
    assert!(!improved.embedding_failed);
    assert_eq!(
        improved.matched.as_ref().map(|m| m.method),
        Some(MatchMethod::Embedding)
    );
    assert_eq!(improved.recommended_tier, ModelTier::Local);
    assert_eq!(embedder.slow_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_route_async_closes_channel_on_background_failure() {
    let embedder = CannedEmbedder::new(&[]);
    embedder.fast_fails.store(true, Ordering::SeqCst);
    embedder.slow_fails.store(true, Ordering::SeqCst);
    let registry = FakeRegistry::new(Vec::new(), Vec::new());
    let router = build_router(embedder, registry);
    router.initialize().await.unwrap();

    let (initial, improvement) = router.route_async("whatever").await;

    assert_eq!(initial.decision, RoutingDecision::Novel);
    assert!(initial.embedding_failed);

    // Channel closes without a value.
    let outcome = improvement.expect("channel present").await;
    assert!(outcome.is_err());
}

// -----------------------------------------------------------------------
// 4. Index lifecycle through the router
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_initialize_skips_templates_without_embeddings() {
    let with = active_template("embedded intent", 0.9, Some(vec![1.0, 0.0, 0.0]));
    let without = active_template("pending intent", 0.9, None);
    let embedder = CannedEmbedder::new(&[]);
    let registry = FakeRegistry::new(vec![with, without], Vec::new());
    let router = build_router(embedder, registry);

    router.initialize().await.unwrap();

    assert_eq!(router.index_size(), 1);
    let stats = router.stats();
    assert!(stats.initialized);
    assert!(stats.last_refresh.is_some());
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let template = active_template("embedded intent", 0.9, Some(vec![1.0, 0.0, 0.0]));
    let embedder = CannedEmbedder::new(&[]);
    let registry = FakeRegistry::new(vec![template], Vec::new());
    let router = build_router(embedder, registry);

    router.initialize().await.unwrap();
    router.initialize().await.unwrap();

    assert_eq!(router.index_size(), 1);
}

#[tokio::test]
async fn test_refresh_if_needed_respects_period() {
    let template = active_template("embedded intent", 0.9, Some(vec![1.0, 0.0, 0.0]));
    let embedder = CannedEmbedder::new(&[]);
    let registry = FakeRegistry::new(vec![template], Vec::new());
    let router = build_router(embedder, registry.clone());

    router.initialize().await.unwrap();
    let calls_after_init = registry.list_calls.load(Ordering::SeqCst);

    // Default period is minutes; an immediate refresh is a no-op.
    let refreshed = router.refresh_if_needed().await.unwrap();
    assert!(!refreshed);
    assert_eq!(registry.list_calls.load(Ordering::SeqCst), calls_after_init);
}

#[tokio::test]
async fn test_add_template_computes_missing_embedding() {
    let intent = "summarize incident reports";
    let embedder = CannedEmbedder::new(&[(intent, vec![0.0, 1.0, 0.0])]);
    let registry = FakeRegistry::new(Vec::new(), Vec::new());
    let router = build_router(embedder.clone(), registry);
    router.initialize().await.unwrap();

    let template = active_template(intent, 0.7, None);
    let id = template.id;
    router.add_template(template).await.unwrap();

    assert_eq!(router.index_size(), 1);
    assert_eq!(embedder.slow_calls.load(Ordering::SeqCst), 1);

    assert!(router.remove_template(&id));
    assert_eq!(router.index_size(), 0);
}

#[tokio::test]
async fn test_add_template_requires_embedder_when_no_embedding() {
    let embedder = CannedEmbedder::new(&[]);
    embedder.up.store(false, Ordering::SeqCst);
    let registry = FakeRegistry::new(Vec::new(), Vec::new());
    let router = build_router(embedder, registry);

    let template = active_template("no vector yet", 0.7, None);
    assert!(router.add_template(template).await.is_err());

    // A pre-computed embedding is accepted regardless of embedder state.
    let template = active_template("has vector", 0.7, Some(vec![1.0, 0.0, 0.0]));
    router.add_template(template).await.unwrap();
    assert_eq!(router.index_size(), 1);
}

#[tokio::test]
async fn test_stats_snapshot() {
    let embedder = CannedEmbedder::new(&[]);
    let registry = FakeRegistry::new(Vec::new(), Vec::new());
    let router = build_router(embedder, registry);

    let stats = router.stats();
    assert!(!stats.initialized);
    assert_eq!(stats.index_size, 0);
    assert_eq!(stats.embedding_model, "canned-test-model");
    assert_eq!(stats.embedding_dimensions, 3);
    assert!(stats.embedder_available);

    router.initialize().await.unwrap();
    assert!(router.stats().initialized);
}
