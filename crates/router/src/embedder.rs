use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{EmbeddingBackend, EmbeddingError};
use crate::embedding::Embedding;

pub type EmbedFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Embedding, EmbeddingError>> + Send + 'a>>;
pub type EmbedBatchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Embedding>, EmbeddingError>> + Send + 'a>>;

/// Object-safe embedding capability set (dyn dispatch).
/// Production uses `EmbeddingBackend` or `EmbedderChain`; tests provide
/// canned-vector fakes.
pub trait Embedder: Send + Sync {
    /// Slow path: full deadline, retries on transient failures.
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;

    /// Fast path: single attempt under the fast deadline, no retries.
    fn embed_fast<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedBatchFuture<'a>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> String;

    fn available(&self) -> bool;

    fn fast_timeout(&self) -> Duration;
}

impl Embedder for EmbeddingBackend {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(EmbeddingBackend::embed(self, text))
    }

    fn embed_fast<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(EmbeddingBackend::embed_fast(self, text))
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedBatchFuture<'a> {
        Box::pin(EmbeddingBackend::embed_batch(self, texts))
    }

    fn dimension(&self) -> usize {
        EmbeddingBackend::dimension(self)
    }

    fn model_name(&self) -> String {
        EmbeddingBackend::model_name(self).to_string()
    }

    fn available(&self) -> bool {
        EmbeddingBackend::available(self)
    }

    fn fast_timeout(&self) -> Duration {
        EmbeddingBackend::fast_timeout(self)
    }
}

/// Chains backends in declared order. Each call selects the first backend
/// whose `available()` is currently true; a recovered earlier backend
/// reclaims the active slot on the next call.
///
/// Per-backend retries are the backend's own responsibility. The chain
/// fails over to the next available backend at most once per call, and only
/// for non-sentinel errors.
pub struct EmbedderChain {
    backends: Vec<Arc<dyn Embedder>>,
    active: AtomicUsize,
}

impl EmbedderChain {
    pub fn new(backends: Vec<Arc<dyn Embedder>>) -> Self {
        Self {
            backends,
            active: AtomicUsize::new(0),
        }
    }

    /// Re-evaluate the active backend: first in declared order that is
    /// currently available.
    fn active(&self) -> Option<(usize, &Arc<dyn Embedder>)> {
        for (index, backend) in self.backends.iter().enumerate() {
            if backend.available() {
                if self.active.swap(index, Ordering::Relaxed) != index {
                    tracing::info!(
                        active = index,
                        model = %backend.model_name(),
                        "Active embedding backend changed"
                    );
                }
                return Some((index, backend));
            }
        }
        None
    }

    /// The backend reflected by `dimension`/`model_name`/`fast_timeout`
    /// accessors: the active one, or the first configured as a fallback.
    fn reflected(&self) -> Option<&Arc<dyn Embedder>> {
        self.active()
            .map(|(_, b)| b)
            .or_else(|| self.backends.first())
    }

    /// Timeouts, quota errors, and unavailability are sentinels the caller
    /// must see unchanged; only opaque provider failures justify failover.
    fn is_sentinel(error: &EmbeddingError) -> bool {
        matches!(
            error,
            EmbeddingError::Timeout
                | EmbeddingError::Unavailable
                | EmbeddingError::QuotaExceeded { .. }
        )
    }

    fn next_available(&self, after: usize) -> Option<(usize, &Arc<dyn Embedder>)> {
        self.backends
            .iter()
            .enumerate()
            .skip(after + 1)
            .find(|(_, b)| b.available())
    }

    fn failover_target(
        &self,
        failed: usize,
        error: &EmbeddingError,
    ) -> Option<(usize, &Arc<dyn Embedder>)> {
        if Self::is_sentinel(error) {
            return None;
        }
        let (index, backend) = self.next_available(failed)?;
        tracing::warn!(
            from = failed,
            to = index,
            error = %error,
            "Failing over to next embedding backend"
        );
        self.active.store(index, Ordering::Relaxed);
        metrics::counter!("router.embedder.failovers").increment(1);
        Some((index, backend))
    }
}

impl Embedder for EmbedderChain {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move {
            let Some((index, backend)) = self.active() else {
                return Err(EmbeddingError::Unavailable);
            };
            match backend.embed(text).await {
                Ok(embedding) => Ok(embedding),
                Err(e) => match self.failover_target(index, &e) {
                    Some((_, fallback)) => fallback.embed(text).await,
                    None => Err(e),
                },
            }
        })
    }

    fn embed_fast<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move {
            // No backend maps to the timeout sentinel so fast-path callers
            // follow their ordinary fallback branch.
            let Some((index, backend)) = self.active() else {
                return Err(EmbeddingError::Timeout);
            };
            match backend.embed_fast(text).await {
                Ok(embedding) => Ok(embedding),
                Err(e) => match self.failover_target(index, &e) {
                    Some((_, fallback)) => fallback.embed_fast(text).await,
                    None => Err(e),
                },
            }
        })
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedBatchFuture<'a> {
        Box::pin(async move {
            let Some((index, backend)) = self.active() else {
                return Err(EmbeddingError::Unavailable);
            };
            match backend.embed_batch(texts).await {
                Ok(embeddings) => Ok(embeddings),
                Err(e) => match self.failover_target(index, &e) {
                    Some((_, fallback)) => fallback.embed_batch(texts).await,
                    None => Err(e),
                },
            }
        })
    }

    fn dimension(&self) -> usize {
        self.reflected().map(|b| b.dimension()).unwrap_or(0)
    }

    fn model_name(&self) -> String {
        self.reflected()
            .map(|b| b.model_name())
            .unwrap_or_else(|| "none".to_string())
    }

    fn available(&self) -> bool {
        self.backends.iter().any(|b| b.available())
    }

    fn fast_timeout(&self) -> Duration {
        self.reflected()
            .map(|b| b.fast_timeout())
            .unwrap_or(Duration::from_secs(5))
    }
}
