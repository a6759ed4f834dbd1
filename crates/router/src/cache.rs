use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::embedding::Embedding;

/// Monotone hit/miss counters plus current size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

struct CacheEntry {
    embedding: Embedding,
    inserted_at: Instant,
    /// Recency sequence number; the smallest value is the LRU end.
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    /// Monotone counter driving exact LRU ordering.
    tick: u64,
}

/// Bounded LRU embedding cache with TTL expiry.
///
/// Keys are normalized (lowercase + trim); two inputs that normalize to the
/// same key are treated as semantic duplicates. Expired entries are evicted
/// lazily on access. A capacity of zero disables the cache entirely.
pub struct EmbeddingCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                tick: 0,
            }),
            capacity,
            ttl,
        }
    }

    fn normalize_key(key: &str) -> String {
        key.trim().to_lowercase()
    }

    /// Look up an embedding. A hit refreshes the entry's LRU position.
    pub fn get(&self, key: &str) -> Option<Embedding> {
        let key = Self::normalize_key(key);
        let mut inner = self.inner.lock().unwrap();

        if self.capacity != 0 {
            let state = inner
                .entries
                .get(&key)
                .map(|entry| entry.inserted_at.elapsed() < self.ttl);
            match state {
                Some(true) => {
                    inner.tick += 1;
                    inner.hits += 1;
                    let tick = inner.tick;
                    metrics::counter!("router.cache.hit").increment(1);
                    if let Some(entry) = inner.entries.get_mut(&key) {
                        entry.last_used = tick;
                        return Some(entry.embedding.clone());
                    }
                }
                Some(false) => {
                    inner.entries.remove(&key);
                }
                None => {}
            }
        }

        inner.misses += 1;
        metrics::counter!("router.cache.miss").increment(1);
        None
    }

    /// Insert an embedding, evicting from the LRU end under capacity
    /// pressure. Re-inserting an existing key updates it in place and
    /// refreshes both TTL and LRU position.
    pub fn put(&self, key: &str, embedding: Embedding) {
        if self.capacity == 0 {
            return;
        }

        let key = Self::normalize_key(key);
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.embedding = embedding;
            entry.inserted_at = Instant::now();
            entry.last_used = tick;
            return;
        }

        while inner.entries.len() >= self.capacity {
            let lru_key = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match lru_key {
                Some(k) => {
                    inner.entries.remove(&k);
                    metrics::counter!("router.cache.evictions").increment(1);
                }
                None => break,
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                embedding,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
        }
    }
}
