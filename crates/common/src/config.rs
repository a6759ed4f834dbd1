use serde::{Deserialize, Serialize};

/// Top-level system configuration, deserialized from system.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemConfig {
    pub router: RouterConfig,
    pub models: ModelsConfig,
    pub backends: Vec<BackendConfig>,
}

/// Router engine parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Similarity at or above which a template is a strong match (0.0–1.0).
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    /// Similarity at or above which a template is a moderate match.
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
    /// Minimum similarity for any template match; below this the request
    /// is novel.
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    /// Interval in seconds between index rebuilds from the registry.
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    /// Number of nearest templates fetched per route.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Max keyword matches requested from the registry on the fallback path.
    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: usize,
}

fn default_high_threshold() -> f64 {
    0.85
}

fn default_medium_threshold() -> f64 {
    0.70
}

fn default_low_threshold() -> f64 {
    0.50
}

fn default_refresh_seconds() -> u64 {
    300
}

fn default_top_k() -> usize {
    5
}

fn default_keyword_limit() -> usize {
    5
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            low_threshold: default_low_threshold(),
            refresh_seconds: default_refresh_seconds(),
            top_k: default_top_k(),
            keyword_limit: default_keyword_limit(),
        }
    }
}

/// Concrete model identifiers per tier. Opaque to the router; the
/// orchestrator resolves them against its provider catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_local_model")]
    pub local: String,
    #[serde(default = "default_mid_model")]
    pub mid: String,
    #[serde(default = "default_advanced_model")]
    pub advanced: String,
    /// Also the distillation target for novel requests.
    #[serde(default = "default_frontier_model")]
    pub frontier: String,
}

fn default_local_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_mid_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_advanced_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_frontier_model() -> String {
    "claude-opus-4-20250514".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            local: default_local_model(),
            mid: default_mid_model(),
            advanced: default_advanced_model(),
            frontier: default_frontier_model(),
        }
    }
}

/// Configuration for a single embedding backend. Backends are tried in
/// declared order by the embedder chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Provider kind ("local" for an Ollama-style server, "cloud" for an
    /// OpenAI-compatible API).
    pub provider: String,
    /// Base URL of the provider.
    pub base_url: String,
    /// Model identifier (e.g. "nomic-embed-text", "text-embedding-3-small").
    pub model: String,
    /// Expected embedding vector dimensions.
    pub dimensions: usize,
    /// Environment variable name for the API key (cloud providers only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Fast-path deadline in milliseconds. Single attempt, no retries.
    #[serde(default = "default_fast_timeout_ms")]
    pub fast_timeout_ms: u64,
    /// Slow-path deadline in milliseconds. Bounds the full retry loop.
    #[serde(default = "default_slow_timeout_ms")]
    pub slow_timeout_ms: u64,
    /// Max attempts on the slow path for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Constant delay between retry attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Whether this backend keeps an embedding cache.
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    /// Max entries in the embedding cache. Zero disables the cache.
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    /// Cache entry TTL in seconds.
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    /// How long the backend stays unavailable after a quota response.
    #[serde(default = "default_quota_cooldown_seconds")]
    pub quota_cooldown_seconds: u64,
    /// Interval in seconds between background availability probes.
    #[serde(default = "default_availability_check_seconds")]
    pub availability_check_seconds: u64,
    /// Pull the model on the local provider if the availability probe
    /// reports it missing.
    #[serde(default)]
    pub auto_pull: bool,
}

fn default_fast_timeout_ms() -> u64 {
    5_000
}

fn default_slow_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_max_size() -> usize {
    1_000
}

fn default_cache_ttl_seconds() -> u64 {
    3_600
}

fn default_quota_cooldown_seconds() -> u64 {
    3_600
}

fn default_availability_check_seconds() -> u64 {
    60
}
