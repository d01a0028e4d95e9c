//! Embedding cache: memoizes `embed(text)` keyed by a content hash.
//!
//! Eviction is strict LRU. Every insert and every hit takes a fresh value
//! from a monotonically increasing tick, so recency ties cannot occur and
//! entries never touched again leave in insertion order.
//!
//! Concurrent misses on the same key share one computation. The LRU table
//! and the in-flight table live under one lock, so a caller either hits the
//! cache or joins the in-flight computation and never starts a duplicate.

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use simstore_core::{SimstoreResult, Vector};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// 128-bit digest of normalized text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Hash `text` after [`normalize_text`].
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(normalize_text(text).as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

/// Trim and collapse whitespace runs to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Counters exposed by [`EmbeddingCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to wait for or run a computation.
    pub misses: u64,
    /// Misses that joined a computation already in flight.
    pub coalesced: u64,
    /// Calls made to the embedding function.
    pub computations: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
    /// Current number of entries.
    pub len: usize,
    /// Maximum number of entries.
    pub capacity: usize,
}

struct CacheSlot {
    vector: Vector,
    tick: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<ContentHash, CacheSlot>,
    /// tick -> key; the first entry is the least recently used.
    recency: BTreeMap<u64, ContentHash>,
    next_tick: u64,
    in_flight: HashMap<ContentHash, Arc<OnceCell<Vector>>>,
    stats: CacheStats,
}

impl CacheInner {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Return a hit and mark it most recently used.
    fn touch(&mut self, key: &ContentHash) -> Option<Vector> {
        let tick = self.bump();
        let slot = self.entries.get_mut(key)?;
        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, *key);
        Some(slot.vector.clone())
    }

    /// Insert (or refresh) an entry, then evict down to `capacity`.
    fn commit(&mut self, key: ContentHash, vector: &Vector, capacity: usize) {
        if self.touch(&key).is_some() {
            return;
        }
        let tick = self.bump();
        self.entries.insert(
            key,
            CacheSlot {
                vector: vector.clone(),
                tick,
            },
        );
        self.recency.insert(tick, key);

        while self.entries.len() > capacity {
            let Some((_, victim)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&victim);
            self.stats.evictions += 1;
            tracing::debug!(key = %victim.to_hex(), "Evicted cached embedding");
        }
    }
}

/// Bounded LRU cache of embeddings with single-flight misses.
pub struct EmbeddingCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Return the cached embedding for `text`, computing it on a miss.
    ///
    /// On a hit the entry becomes most recently used. On a miss `embed_fn`
    /// receives the original text; its result is stored and the least
    /// recently used entry is evicted if capacity is exceeded. A failed or
    /// cancelled computation stores nothing and leaves recency untouched.
    ///
    /// Concurrent calls for the same key run `embed_fn` once; the others wait
    /// and reuse the result. If that computation fails or is cancelled, one
    /// waiter runs its own `embed_fn` instead.
    pub async fn get_or_compute<F, Fut>(&self, text: &str, embed_fn: F) -> SimstoreResult<Vector>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = SimstoreResult<Vector>>,
    {
        let key = ContentHash::of(text);

        let cell = {
            let mut inner = self.inner.lock();
            if let Some(vector) = inner.touch(&key) {
                inner.stats.hits += 1;
                return Ok(vector);
            }
            inner.stats.misses += 1;
            match inner.in_flight.get(&key).cloned() {
                Some(cell) => {
                    inner.stats.coalesced += 1;
                    cell
                }
                None => {
                    let cell = Arc::new(OnceCell::new());
                    inner.in_flight.insert(key, cell.clone());
                    cell
                }
            }
        };
        let guard = InFlightGuard {
            cache: self,
            key,
            cell: Some(cell),
        };

        let owned = text.to_string();
        let vector = guard
            .cell()
            .get_or_try_init(|| {
                self.inner.lock().stats.computations += 1;
                tracing::debug!(key = %key.to_hex(), "Computing embedding");
                embed_fn(owned)
            })
            .await?
            .clone();

        self.inner.lock().commit(key, &vector, self.capacity);
        Ok(vector)
    }

    /// Peek at a cached embedding without changing recency.
    pub fn get(&self, text: &str) -> Option<Vector> {
        let key = ContentHash::of(text);
        self.inner
            .lock()
            .entries
            .get(&key)
            .map(|slot| slot.vector.clone())
    }

    /// Whether `text` has a cached embedding.
    pub fn contains(&self, text: &str) -> bool {
        self.inner.lock().entries.contains_key(&ContentHash::of(text))
    }

    /// Number of cached embeddings.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached embeddings.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every cached entry. In-flight computations are unaffected.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            len: inner.entries.len(),
            capacity: self.capacity,
            ..inner.stats
        }
    }
}

/// Holds one caller's share of an in-flight computation. The last holder
/// to leave removes the in-flight entry, whatever the outcome.
struct InFlightGuard<'a> {
    cache: &'a EmbeddingCache,
    key: ContentHash,
    cell: Option<Arc<OnceCell<Vector>>>,
}

impl InFlightGuard<'_> {
    fn cell(&self) -> &OnceCell<Vector> {
        match &self.cell {
            Some(cell) => cell,
            None => unreachable!("in-flight cell is only taken on drop"),
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let Some(cell) = self.cell.take() else {
            return;
        };
        let mut inner = self.cache.inner.lock();
        let ours = inner
            .in_flight
            .get(&self.key)
            .is_some_and(|c| Arc::ptr_eq(c, &cell));
        // Release our share under the lock so the count below is exact.
        drop(cell);
        if ours
            && inner
                .in_flight
                .get(&self.key)
                .is_some_and(|c| Arc::strong_count(c) == 1)
        {
            inner.in_flight.remove(&self.key);
        }
    }
}
