use crate::bm25::{Bm25Index, LexicalQuery};
use crate::exact::cosine_similarity;
use simstore_core::VectorRecord;

/// Fuses cosine similarity with normalized BM25 relevance.
///
/// ```text
/// score = w * cosine(query_vector, candidate.vector)
///       + (1 - w) * lexical(query_text, candidate.raw_text)
/// ```
///
/// - `w = 1.0`: pure semantic ranking
/// - `w = 0.0`: pure lexical ranking
///
/// Without query text the lexical side is undefined, so `w` is forced to
/// 1.0 rather than mixing in zeros.
pub struct HybridScorer<'a> {
    semantic_weight: f64,
    lexical: Option<(&'a Bm25Index, LexicalQuery)>,
}

impl<'a> HybridScorer<'a> {
    /// Build a scorer for one query against one index state.
    ///
    /// `QueryEngine::query` rejects weights outside [0, 1]; here they are
    /// clamped, and NaN counts as 1.0.
    pub fn new(semantic_weight: f64, query_text: Option<&str>, bm25: &'a Bm25Index) -> Self {
        let semantic_weight = if semantic_weight.is_nan() {
            1.0
        } else {
            semantic_weight.clamp(0.0, 1.0)
        };
        match query_text {
            Some(text) if semantic_weight < 1.0 => Self {
                semantic_weight,
                lexical: Some((bm25, bm25.prepare(text))),
            },
            _ => Self {
                semantic_weight: 1.0,
                lexical: None,
            },
        }
    }

    /// The weight actually applied to the semantic side.
    pub fn effective_weight(&self) -> f64 {
        self.semantic_weight
    }

    /// Whether any lexical signal contributes.
    pub fn is_hybrid(&self) -> bool {
        self.lexical.is_some()
    }

    /// Score one candidate. Deterministic for identical inputs.
    pub fn score(&self, query_vector: &[f32], candidate: &VectorRecord) -> f64 {
        let semantic = cosine_similarity(query_vector, &candidate.vector);
        match &self.lexical {
            None => semantic,
            Some((bm25, query)) => {
                let lexical = bm25.normalized_score(query, &candidate.id);
                self.semantic_weight * semantic + (1.0 - self.semantic_weight) * lexical
            }
        }
    }
}
