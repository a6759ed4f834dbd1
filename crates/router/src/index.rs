use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, RwLock};

use tierroute_common::types::Template;

use crate::embedding::Embedding;

/// An entry scored against a query.
#[derive(Clone, Debug)]
pub struct SearchResult {
    pub id: String,
    /// Cosine score in [-1, 1]; semantic-text embeddings land in [0, 1].
    pub score: f64,
    pub template: Arc<Template>,
}

struct IndexEntry {
    /// Stored normalized. The index owns this buffer.
    embedding: Embedding,
    template: Arc<Template>,
}

struct IndexInner {
    entries: HashMap<String, IndexEntry>,
    /// Insertion order, for deterministic iteration and score tie-breaks.
    order: Vec<String>,
}

/// In-memory vector index over template intent embeddings.
///
/// Shared-read/exclusive-write: any number of concurrent searches, one
/// writer at a time. Batch operations apply under a single write lock, so
/// readers never observe a partially-applied batch.
pub struct VectorIndex {
    inner: RwLock<IndexInner>,
}

/// Heap ordering: higher score wins, ties broken by earlier insertion.
struct Ranked {
    score: f64,
    position: usize,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Insert or replace. A replaced id keeps its position in the iteration
    /// order. The vector is normalized and copied; the caller keeps its own.
    pub fn add(&self, id: impl Into<String>, embedding: &Embedding, template: Arc<Template>) {
        let id = id.into();
        let mut inner = self.inner.write().unwrap();
        Self::insert_locked(&mut inner, id, embedding, template);
        metrics::gauge!("router.index.size").set(inner.order.len() as f64);
    }

    /// Remove an entry. O(n) on the order list. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let existed = inner.entries.remove(id).is_some();
        if existed {
            inner.order.retain(|o| o != id);
            metrics::gauge!("router.index.size").set(inner.order.len() as f64);
        }
        existed
    }

    /// Insert a batch atomically with respect to readers.
    pub fn batch_add(&self, items: Vec<(String, Embedding, Arc<Template>)>) {
        let mut inner = self.inner.write().unwrap();
        for (id, embedding, template) in items {
            Self::insert_locked(&mut inner, id, &embedding, template);
        }
        metrics::gauge!("router.index.size").set(inner.order.len() as f64);
    }

    /// Remove a batch atomically with respect to readers.
    pub fn batch_remove(&self, ids: &[String]) {
        let mut inner = self.inner.write().unwrap();
        let IndexInner { entries, order } = &mut *inner;
        for id in ids {
            entries.remove(id);
        }
        order.retain(|o| entries.contains_key(o));
        metrics::gauge!("router.index.size").set(inner.order.len() as f64);
    }

    /// Replace the entire contents under one write lock. Used by index
    /// refresh; readers see either the old or the new population.
    pub fn replace_all(&self, items: Vec<(String, Embedding, Arc<Template>)>) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.clear();
        inner.order.clear();
        for (id, embedding, template) in items {
            Self::insert_locked(&mut inner, id, &embedding, template);
        }
        metrics::gauge!("router.index.size").set(inner.order.len() as f64);
    }

    fn insert_locked(
        inner: &mut IndexInner,
        id: String,
        embedding: &Embedding,
        template: Arc<Template>,
    ) {
        let entry = IndexEntry {
            embedding: embedding.normalize(),
            template,
        };
        if inner.entries.insert(id.clone(), entry).is_none() {
            inner.order.push(id);
        }
    }

    /// Top-k nearest entries by cosine score, descending, ties broken by
    /// insertion order. Uses a bounded min-heap for O(n log k); when the
    /// index fits in k a plain descending sort is used instead.
    pub fn search(&self, query: &Embedding, k: usize) -> Vec<SearchResult> {
        if k == 0 {
            return Vec::new();
        }

        let query = query.normalize();
        let inner = self.inner.read().unwrap();

        if inner.order.len() <= k {
            let mut results: Vec<(Ranked, SearchResult)> = inner
                .order
                .iter()
                .enumerate()
                .filter_map(|(position, id)| Self::score_entry(&inner, &query, id, position))
                .collect();
            results.sort_by(|a, b| b.0.cmp(&a.0));
            return results.into_iter().map(|(_, r)| r).collect();
        }

        let mut heap: BinaryHeap<Reverse<(Ranked, usize)>> = BinaryHeap::with_capacity(k + 1);
        let mut kept: Vec<Option<SearchResult>> = Vec::new();
        for (position, id) in inner.order.iter().enumerate() {
            if let Some((ranked, result)) = Self::score_entry(&inner, &query, id, position) {
                kept.push(Some(result));
                heap.push(Reverse((ranked, kept.len() - 1)));
                if heap.len() > k {
                    if let Some(Reverse((_, slot))) = heap.pop() {
                        kept[slot] = None;
                    }
                }
            }
        }

        let mut top: Vec<(Ranked, usize)> = heap.into_iter().map(|Reverse(item)| item).collect();
        top.sort_by(|a, b| b.0.cmp(&a.0));
        top.into_iter()
            .filter_map(|(_, slot)| kept[slot].take())
            .collect()
    }

    /// All entries scoring at or above the threshold, descending.
    pub fn search_with_threshold(&self, query: &Embedding, threshold: f64) -> Vec<SearchResult> {
        let query = query.normalize();
        let inner = self.inner.read().unwrap();

        let mut results: Vec<(Ranked, SearchResult)> = inner
            .order
            .iter()
            .enumerate()
            .filter_map(|(position, id)| Self::score_entry(&inner, &query, id, position))
            .filter(|(ranked, _)| ranked.score >= threshold)
            .collect();
        results.sort_by(|a, b| b.0.cmp(&a.0));
        results.into_iter().map(|(_, r)| r).collect()
    }

    fn score_entry(
        inner: &IndexInner,
        query: &Embedding,
        id: &str,
        position: usize,
    ) -> Option<(Ranked, SearchResult)> {
        let entry = inner.entries.get(id)?;
        let score = query.cosine_similarity(&entry.embedding);
        Some((
            Ranked { score, position },
            SearchResult {
                id: id.to_string(),
                score,
                template: Arc::clone(&entry.template),
            },
        ))
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.clear();
        inner.order.clear();
        metrics::gauge!("router.index.size").set(0.0);
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.inner.read().unwrap().order.clone()
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}
