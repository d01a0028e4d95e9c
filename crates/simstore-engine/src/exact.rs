//! Brute-force cosine search: the baseline every other path is checked against.

use crate::store::RecordStore;
use simstore_core::VectorRecord;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Tolerance for treating two scores as tied in comparisons outside ranking.
///
/// Ranking itself compares scores exactly and breaks ties on id.
pub const SCORE_EPSILON: f64 = 1e-9;

/// Cosine similarity between two vectors, accumulated in `f64`.
///
/// Returns 0.0 when either vector has zero norm or the lengths differ, so
/// the result is never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let sim = dot / (na.sqrt() * nb.sqrt());
    if sim.is_finite() {
        sim
    } else {
        0.0
    }
}

/// A record id paired with its score.
///
/// Orders best-first: higher score, then lexicographically smaller id.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    /// Record id.
    pub id: String,
    /// Similarity or fused score.
    pub score: f64,
}

impl ScoredId {
    /// Pair an id with a score.
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }

    /// Best-first comparison: `Less` means `self` ranks ahead of `other`.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl Eq for ScoredId {}

impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// Keep the best `k` of `scored`, returned best-first.
///
/// Uses a bounded max-heap keyed on rank order, so the worst kept entry sits
/// on top and is displaced first.
pub fn top_k(scored: impl IntoIterator<Item = ScoredId>, k: usize) -> Vec<ScoredId> {
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<ScoredId> = BinaryHeap::with_capacity(k + 1);
    for item in scored {
        if heap.len() < k {
            heap.push(item);
        } else if let Some(worst) = heap.peek() {
            if item.rank_cmp(worst) == Ordering::Less {
                heap.pop();
                heap.push(item);
            }
        }
    }
    heap.into_sorted_vec()
}

/// Sort every entry best-first.
pub fn rank_all(mut scored: Vec<ScoredId>) -> Vec<ScoredId> {
    scored.sort_by(ScoredId::rank_cmp);
    scored
}

/// Exhaustive cosine index. Needs no build step; it reads vectors straight
/// out of the [`RecordStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactIndex;

impl ExactIndex {
    /// Create the index.
    pub fn new() -> Self {
        Self
    }

    /// Top `k` candidates by cosine similarity to `query`.
    ///
    /// `candidate_ids` of `None` means every record in the store.
    pub fn search(
        &self,
        store: &RecordStore,
        query: &[f32],
        candidate_ids: Option<&[&str]>,
        k: usize,
    ) -> Vec<ScoredId> {
        match candidate_ids {
            Some(ids) => {
                let records = ids.iter().map(|id| store.expect_indexed(id));
                self.rank(records, |r| cosine_similarity(query, &r.vector), k)
            }
            None => self.rank(store.iter(), |r| cosine_similarity(query, &r.vector), k),
        }
    }

    /// Score `records` with `score_fn` and keep the best `k`.
    pub fn rank<'a, I, F>(&self, records: I, score_fn: F, k: usize) -> Vec<ScoredId>
    where
        I: IntoIterator<Item = &'a VectorRecord>,
        F: Fn(&VectorRecord) -> f64,
    {
        top_k(
            records
                .into_iter()
                .map(|r| ScoredId::new(r.id.clone(), score_fn(r))),
            k,
        )
    }
}
