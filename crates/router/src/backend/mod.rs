mod cloud;
mod local;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tierroute_common::config::BackendConfig;

use crate::cache::EmbeddingCache;
use crate::embedding::Embedding;

/// Which wire protocol a backend speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Ollama-style local inference server.
    Local,
    /// OpenAI-compatible hosted API.
    Cloud,
}

/// Errors from embedding generation.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Fast-path budget elapsed before the provider answered.
    #[error("Embedding request timed out")]
    Timeout,

    /// No backend is currently usable.
    #[error("Embedder not available")]
    Unavailable,

    #[error("Embedding quota exceeded (retry after {retry_after:?}s)")]
    QuotaExceeded { retry_after: Option<u64> },

    #[error("Embedding HTTP error: {0}")]
    Http(String),

    #[error("Embedding auth error: {0}")]
    Auth(String),

    #[error("Embedding API error: {0}")]
    Api(String),

    #[error("Embedding backend misconfigured: {0}")]
    Config(String),
}

/// Connection-level failure signatures worth retrying.
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "connection refused",
    "connection reset",
    "EOF",
];

/// Whether an error message describes a transient, retryable condition.
pub fn is_transient_message(message: &str) -> bool {
    TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
}

impl EmbeddingError {
    /// Whether the slow path should retry after this error. Quota and auth
    /// failures never are.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Timeout => true,
            EmbeddingError::Http(m) | EmbeddingError::Api(m) => is_transient_message(m),
            _ => false,
        }
    }
}

impl From<EmbeddingError> for tierroute_common::TierRouteError {
    fn from(e: EmbeddingError) -> Self {
        tierroute_common::TierRouteError::Embedding(e.to_string())
    }
}

/// Availability state. Guarded by a std::sync::Mutex because it is never
/// held across await points.
struct AvailabilityState {
    available: bool,
    quota_reset: Option<Instant>,
}

/// A single embedding backend: one provider, one model, dual timeouts, an
/// optional cache, and availability/quota-cooldown state.
pub struct EmbeddingBackend {
    provider: EmbeddingProvider,
    http: reqwest::Client,
    config: BackendConfig,
    api_key: Option<String>,
    cache: Option<EmbeddingCache>,
    state: Mutex<AvailabilityState>,
    /// Expected dimension; adopts the observed dimension when a provider
    /// response disagrees.
    dimensions: AtomicUsize,
}

impl EmbeddingBackend {
    /// Build a backend from config. Rejects unknown providers and cloud
    /// configs whose credential env var is unset.
    pub fn new(config: BackendConfig) -> Result<Self, EmbeddingError> {
        let provider = match config.provider.as_str() {
            "local" => EmbeddingProvider::Local,
            "cloud" => EmbeddingProvider::Cloud,
            other => {
                return Err(EmbeddingError::Config(format!(
                    "Unknown provider: {}",
                    other
                )))
            }
        };

        let api_key = match provider {
            EmbeddingProvider::Cloud => {
                let env_var = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
                match std::env::var(env_var) {
                    Ok(key) if !key.is_empty() => Some(key),
                    _ => {
                        return Err(EmbeddingError::Config(format!(
                            "API key env var {} not set",
                            env_var
                        )))
                    }
                }
            }
            EmbeddingProvider::Local => None,
        };

        // No wall-clock timeout on the client itself — responses may be
        // large. Total time is bounded per call with tokio::time::timeout.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| EmbeddingError::Config(e.to_string()))?;

        let cache = config.cache_enabled.then(|| {
            EmbeddingCache::new(
                config.cache_max_size,
                Duration::from_secs(config.cache_ttl_seconds),
            )
        });

        let dimensions = AtomicUsize::new(config.dimensions);

        Ok(Self {
            provider,
            http,
            config,
            api_key,
            cache,
            state: Mutex::new(AvailabilityState {
                available: true,
                quota_reset: None,
            }),
            dimensions,
        })
    }

    /// Whether this backend is currently usable. A lapsed quota cooldown is
    /// cleared here.
    pub fn available(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if let Some(reset) = state.quota_reset {
            if Instant::now() >= reset {
                state.quota_reset = None;
                state.available = true;
                tracing::info!(
                    model = %self.config.model,
                    "Quota cooldown expired, backend available again"
                );
            } else {
                return false;
            }
        }
        state.available
    }

    pub fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    pub fn dimension(&self) -> usize {
        self.dimensions.load(Ordering::Relaxed)
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    pub fn fast_timeout(&self) -> Duration {
        Duration::from_millis(self.config.fast_timeout_ms)
    }

    pub fn cache_stats(&self) -> Option<crate::cache::CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Full slow-path embedding: cache, then provider call with retries on
    /// transient failures, all bounded by the slow timeout.
    pub async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(text) {
                return Ok(hit);
            }
        }

        if let Some(remaining) = self.cooldown_remaining() {
            return Err(EmbeddingError::QuotaExceeded {
                retry_after: Some(remaining),
            });
        }

        let slow = Duration::from_millis(self.config.slow_timeout_ms);
        let result = match tokio::time::timeout(slow, self.call_with_retries(text)).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout),
        };

        match result {
            Ok(values) => Ok(self.accept(text, values)),
            Err(e) => {
                self.record_failure(&e);
                metrics::counter!("router.embedding.errors").increment(1);
                Err(e)
            }
        }
    }

    /// Non-blocking path: cache hit wins regardless of backend state; a
    /// miss gets a single provider attempt under the fast deadline.
    ///
    /// A fast-path timeout does not degrade availability: a cold local
    /// model routinely misses the fast budget while loading, and the slow
    /// path may still succeed.
    pub async fn embed_fast(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(text) {
                return Ok(hit);
            }
        }

        if let Some(remaining) = self.cooldown_remaining() {
            return Err(EmbeddingError::QuotaExceeded {
                retry_after: Some(remaining),
            });
        }

        let fast = Duration::from_millis(self.config.fast_timeout_ms);
        match tokio::time::timeout(fast, self.call_provider(text)).await {
            Err(_) => {
                metrics::counter!("router.embedding.fast_timeouts").increment(1);
                Err(EmbeddingError::Timeout)
            }
            Ok(Ok(values)) => Ok(self.accept(text, values)),
            Ok(Err(e)) => {
                self.record_failure(&e);
                metrics::counter!("router.embedding.errors").increment(1);
                Err(e)
            }
        }
    }

    /// Embed several texts. Cloud providers use their native batch call;
    /// the local provider loops. Failure of any element fails the batch.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match self.provider {
            EmbeddingProvider::Cloud => {
                if let Some(remaining) = self.cooldown_remaining() {
                    return Err(EmbeddingError::QuotaExceeded {
                        retry_after: Some(remaining),
                    });
                }

                let api_key = self.api_key.as_deref().ok_or_else(|| {
                    EmbeddingError::Config("Cloud backend missing API key".into())
                })?;
                let slow = Duration::from_millis(self.config.slow_timeout_ms);
                let call = cloud::call_cloud_embeddings(
                    &self.http,
                    &self.config.base_url,
                    api_key,
                    &self.config.model,
                    texts,
                );
                let result = match tokio::time::timeout(slow, call).await {
                    Ok(result) => result,
                    Err(_) => Err(EmbeddingError::Timeout),
                };

                match result {
                    Ok(batches) => Ok(texts
                        .iter()
                        .zip(batches)
                        .map(|(text, values)| self.accept(text, values))
                        .collect()),
                    Err(e) => {
                        self.record_failure(&e);
                        metrics::counter!("router.embedding.errors").increment(1);
                        Err(e)
                    }
                }
            }
            EmbeddingProvider::Local => {
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    out.push(self.embed(text).await?);
                }
                Ok(out)
            }
        }
    }

    /// Probe the provider and update the availability flag. Local backends
    /// check the model listing (optionally pulling a missing model); cloud
    /// backends are considered reachable whenever not in quota cooldown.
    pub async fn check_availability(&self) -> bool {
        if self.cooldown_remaining().is_some() {
            return false;
        }

        let ok = match self.provider {
            EmbeddingProvider::Local => self.probe_local().await,
            EmbeddingProvider::Cloud => self.api_key.is_some(),
        };

        let mut state = self.state.lock().unwrap();
        if state.quota_reset.is_none() {
            state.available = ok;
        }
        ok && state.quota_reset.is_none()
    }

    async fn probe_local(&self) -> bool {
        match local::probe_model(&self.http, &self.config.base_url, &self.config.model).await {
            Ok(true) => true,
            Ok(false) if self.config.auto_pull => {
                tracing::info!(
                    model = %self.config.model,
                    "Model missing on local provider, pulling"
                );
                match local::pull_model(&self.http, &self.config.base_url, &self.config.model)
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, model = %self.config.model, "Model pull failed");
                        false
                    }
                }
            }
            Ok(false) => {
                tracing::warn!(
                    model = %self.config.model,
                    "Model not present on local provider"
                );
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Local availability probe failed");
                false
            }
        }
    }

    /// Issue a minimal embedding request so local providers load their
    /// model before the first real request. Orchestrators call this at
    /// startup; the router never does.
    pub async fn warmup(&self) {
        let started = Instant::now();
        match self.embed("warmup").await {
            Ok(_) => tracing::info!(
                model = %self.config.model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Embedding backend warm"
            ),
            Err(e) => tracing::warn!(
                model = %self.config.model,
                error = %e,
                "Embedding backend warmup failed"
            ),
        }
    }

    /// Fire-and-forget warmup.
    pub fn spawn_warmup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let backend = Arc::clone(self);
        tokio::spawn(async move { backend.warmup().await })
    }

    fn accept(&self, text: &str, values: Vec<f32>) -> Embedding {
        self.adopt_dimension(values.len());
        let embedding = Embedding::new(values);
        if let Some(cache) = &self.cache {
            cache.put(text, embedding.clone());
        }
        self.record_success();
        embedding
    }

    async fn call_with_retries(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut attempt = 0u32;

        loop {
            match self.call_provider(text).await {
                Ok(values) => return Ok(values),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "Transient embedding error, retrying"
                    );
                    // Constant backoff. The sleep lives inside the caller's
                    // timeout-bounded future, so cancellation abandons it.
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_provider(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self.provider {
            EmbeddingProvider::Local => {
                local::call_local_embeddings(
                    &self.http,
                    &self.config.base_url,
                    &self.config.model,
                    text,
                )
                .await
            }
            EmbeddingProvider::Cloud => {
                let api_key = self.api_key.as_deref().ok_or_else(|| {
                    EmbeddingError::Config("Cloud backend missing API key".into())
                })?;
                let texts = [text.to_string()];
                let mut results = cloud::call_cloud_embeddings(
                    &self.http,
                    &self.config.base_url,
                    api_key,
                    &self.config.model,
                    &texts,
                )
                .await?;
                results
                    .pop()
                    .ok_or_else(|| EmbeddingError::Api("Empty embedding response".into()))
            }
        }
    }

    fn adopt_dimension(&self, observed: usize) {
        let expected = self.dimensions.load(Ordering::Relaxed);
        if observed != 0 && observed != expected {
            tracing::info!(
                expected,
                observed,
                model = %self.config.model,
                "Adopting observed embedding dimension"
            );
            self.dimensions.store(observed, Ordering::Relaxed);
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.available && state.quota_reset.is_none() {
            tracing::info!(model = %self.config.model, "Embedding backend recovered");
        }
        if state.quota_reset.is_none() {
            state.available = true;
        }
    }

    fn record_failure(&self, error: &EmbeddingError) {
        let mut state = self.state.lock().unwrap();
        match error {
            EmbeddingError::QuotaExceeded { retry_after } => {
                let cooldown = Duration::from_secs(self.config.quota_cooldown_seconds);
                state.quota_reset = Some(Instant::now() + cooldown);
                state.available = false;
                tracing::warn!(
                    model = %self.config.model,
                    cooldown_s = self.config.quota_cooldown_seconds,
                    provider_retry_after_s = ?retry_after,
                    "Quota exceeded — backend entering cooldown"
                );
                metrics::counter!("router.backend.quota_trips").increment(1);
            }
            _ => {
                if state.available {
                    tracing::warn!(
                        model = %self.config.model,
                        error = %error,
                        "Embedding backend degraded"
                    );
                }
                state.available = false;
            }
        }
    }

    fn cooldown_remaining(&self) -> Option<u64> {
        let state = self.state.lock().unwrap();
        let reset = state.quota_reset?;
        let now = Instant::now();
        if now < reset {
            Some((reset - now).as_secs())
        } else {
            None
        }
    }
}
