use crate::bm25::Bm25Index;
use crate::cache::{CacheStats, EmbeddingCache};
use crate::clustered::{ClusteredIndex, IndexState};
use crate::embedding::EmbeddingProvider;
use crate::exact::{rank_all, ExactIndex, ScoredId};
use crate::filter::{FilterStage, MetadataFilter};
use crate::hybrid::HybridScorer;
use crate::snapshot;
use crate::store::{ensure_finite, RecordStore};
use parking_lot::RwLock;
use serde::Serialize;
use simstore_core::{
    EngineConfig, Metadata, MetadataValue, SimstoreError, SimstoreResult, Vector, VectorRecord,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of hits when a query does not set `k`.
pub const DEFAULT_K: usize = 10;

/// A similarity query. Needs text, a vector, or both.
///
/// With both, the vector drives semantic scoring and the text drives the
/// lexical half of hybrid scoring.
#[derive(Debug, Clone)]
pub struct Query {
    /// Query text, embedded through the cache when no vector is given.
    pub text: Option<String>,
    /// Caller-supplied query vector.
    pub vector: Option<Vector>,
    /// Number of hits wanted; must be at least 1.
    pub k: usize,
    /// Optional metadata filter.
    pub filter: Option<MetadataFilter>,
    /// Weight of cosine similarity in [0, 1]. `None` uses the engine default.
    pub semantic_weight: Option<f64>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            text: None,
            vector: None,
            k: DEFAULT_K,
            filter: None,
            semantic_weight: None,
        }
    }
}

impl Query {
    /// Query by text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Query by a precomputed vector.
    pub fn vector(vector: Vector) -> Self {
        Self {
            vector: Some(vector),
            ..Self::default()
        }
    }

    /// Attach text to a vector query for hybrid scoring.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the number of hits.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Restrict hits to records matching `filter`.
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the semantic weight.
    pub fn with_semantic_weight(mut self, weight: f64) -> Self {
        self.semantic_weight = Some(weight);
        self
    }
}

/// An item to ingest. Needs text, a vector, or both.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Record id; generated when absent.
    pub id: Option<String>,
    /// Source text; embedded when no vector is given.
    pub text: Option<String>,
    /// Precomputed vector.
    pub vector: Option<Vector>,
    /// Record metadata.
    pub metadata: Metadata,
}

impl IngestRequest {
    /// Ingest text, letting the engine embed it.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Ingest a precomputed vector.
    pub fn vector(vector: Vector) -> Self {
        Self {
            vector: Some(vector),
            ..Self::default()
        }
    }

    /// Use a caller-chosen id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Keep source text alongside a precomputed vector.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Replace the metadata map.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add one metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    /// Record id.
    pub id: String,
    /// Cosine or hybrid score.
    pub score: f64,
    /// The record's metadata.
    pub metadata: Metadata,
}

/// Which index answered a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Brute-force scan of every record.
    Exact,
    /// Probe of the nearest clusters plus the overflow bucket.
    Clustered,
}

/// Ranked hits plus how they were produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// Hits ordered by score descending, then id ascending.
    pub hits: Vec<QueryHit>,
    /// The index that selected candidates.
    pub index: IndexKind,
    /// Some non-empty clusters were not probed.
    pub approximate: bool,
    /// The clustered index has unclustered inserts; recall is approximate
    /// until a rebuild.
    pub stale: bool,
}

impl QueryResponse {
    fn empty() -> Self {
        Self {
            hits: Vec::new(),
            index: IndexKind::Exact,
            approximate: false,
            stale: false,
        }
    }
}

/// Point-in-time engine counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    /// Live record count.
    pub records: usize,
    /// Fixed vector dimension, once known.
    pub dimension: Option<usize>,
    /// Clustered index lifecycle state.
    pub index_state: IndexState,
    /// Number of clusters from the last build.
    pub clusters: usize,
    /// Records inserted since the last build.
    pub overflow: usize,
    /// Embedding cache counters.
    pub cache: CacheStats,
}

/// Everything derived from the record set. Mutated only as a unit.
struct Collection {
    store: RecordStore,
    bm25: Bm25Index,
    clustered: ClusteredIndex,
}

impl Collection {
    fn new(dimension: Option<usize>) -> Self {
        Self {
            store: dimension.map_or_else(RecordStore::new, RecordStore::with_dimension),
            bm25: Bm25Index::new(),
            clustered: ClusteredIndex::new(),
        }
    }

    fn insert(&mut self, record: VectorRecord) -> SimstoreResult<()> {
        let id = record.id.clone();
        let text = record.raw_text.clone();
        self.store.insert_record(record)?;
        self.bm25.add_document(&id, &text);
        self.clustered.insert(&id);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        if !self.store.delete(id) {
            return false;
        }
        self.bm25.remove_document(id);
        self.clustered.remove(id);
        true
    }

    /// Id and vector columns for an off-lock k-means run.
    fn columns(&self) -> (Vec<String>, Vec<Vector>) {
        self.store
            .sorted_records()
            .into_iter()
            .map(|r| (r.id.clone(), r.vector.clone()))
            .unzip()
    }
}

/// Similarity search over embedded records.
///
/// Reads run concurrently. Writes (ingest, delete, rebuild, import) are
/// serialized by an async writer gate and commit under a short write lock,
/// so readers never observe a half-applied write. Embedding happens before
/// any lock is taken, and k-means runs on a blocking worker while readers
/// keep using the previous index.
pub struct QueryEngine {
    config: EngineConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    collection: RwLock<Collection>,
    writer: tokio::sync::Mutex<()>,
}

impl QueryEngine {
    /// Create an empty engine.
    pub fn new(config: EngineConfig, embedder: Arc<dyn EmbeddingProvider>) -> SimstoreResult<Self> {
        config.validate()?;
        Ok(Self {
            cache: EmbeddingCache::new(config.cache_capacity),
            collection: RwLock::new(Collection::new(config.dimension)),
            writer: tokio::sync::Mutex::new(()),
            embedder,
            config,
        })
    }

    /// The configuration the engine runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The embedding cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Embed `text` through the cache, bounded by `embed_timeout_ms`.
    ///
    /// Provider errors surface as `EmbeddingFailed`. On timeout nothing is
    /// cached and the computation is abandoned.
    pub async fn embed(&self, text: &str) -> SimstoreResult<Vector> {
        let embedder = self.embedder.clone();
        let compute = self.cache.get_or_compute(text, move |text| async move {
            embedder.embed(&text).await.map_err(|e| match e {
                SimstoreError::EmbeddingFailed(_) => e,
                other => SimstoreError::EmbeddingFailed(other.to_string()),
            })
        });

        match self.config.embed_timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), compute)
                .await
                .map_err(|_| SimstoreError::EmbeddingFailed(format!("timed out after {ms}ms")))?,
            None => compute.await,
        }
    }

    /// Store one item and return its id.
    ///
    /// The vector is taken from the request or computed from its text. The
    /// record is committed to the store and both indexes at once, or not at
    /// all. May trigger an automatic index rebuild afterwards.
    pub async fn ingest(&self, request: IngestRequest) -> SimstoreResult<String> {
        let IngestRequest {
            id,
            text,
            vector,
            metadata,
        } = request;

        let vector = match (vector, text.as_deref()) {
            (Some(vector), _) => vector,
            (None, Some(text)) => self.embed(text).await?,
            (None, None) => {
                return Err(SimstoreError::InvalidQuery(
                    "ingest needs text or a vector".to_string(),
                ))
            }
        };
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = VectorRecord::new(id.clone(), vector, text.unwrap_or_default(), metadata);

        let _gate = self.writer.lock().await;
        self.collection.write().insert(record)?;
        debug!(id = %id, "Record ingested");

        self.auto_rebuild().await;
        Ok(id)
    }

    /// Look up a record by id.
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.collection.read().store.get(id).cloned()
    }

    /// Remove a record. Returns `false` if the id was unknown.
    pub async fn delete(&self, id: &str) -> bool {
        let _gate = self.writer.lock().await;
        let removed = self.collection.write().remove(id);
        if removed {
            debug!(id = %id, "Record deleted");
        }
        removed
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.collection.read().store.len()
    }

    /// Whether the engine holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed vector dimension, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.collection.read().store.dimension()
    }

    /// Lifecycle state of the clustered index.
    pub fn index_state(&self) -> IndexState {
        self.collection.read().clustered.state()
    }

    /// Counters for the collection, index and cache.
    pub fn stats(&self) -> EngineStats {
        let collection = self.collection.read();
        EngineStats {
            records: collection.store.len(),
            dimension: collection.store.dimension(),
            index_state: collection.clustered.state(),
            clusters: collection.clustered.clusters().len(),
            overflow: collection.clustered.overflow().len(),
            cache: self.cache.stats(),
        }
    }

    /// Answer a similarity query.
    ///
    /// Pipeline: validate, resolve the query vector, pick the exact or
    /// clustered candidate set, filter, score, keep the top `k`.
    pub async fn query(&self, query: Query) -> SimstoreResult<QueryResponse> {
        if query.k < 1 {
            return Err(SimstoreError::InvalidQuery(
                "k must be at least 1".to_string(),
            ));
        }
        if query.text.is_none() && query.vector.is_none() {
            return Err(SimstoreError::InvalidQuery(
                "query needs text or a vector".to_string(),
            ));
        }
        if let Some(weight) = query.semantic_weight {
            if !(0.0..=1.0).contains(&weight) {
                return Err(SimstoreError::InvalidQuery(format!(
                    "semantic_weight must be in [0, 1], got {weight}"
                )));
            }
        }
        if let Some(vector) = &query.vector {
            ensure_finite(vector)?;
        }
        // Absent records are an empty answer, not an error.
        if self.is_empty() {
            return Ok(QueryResponse::empty());
        }

        let query_vector = match (&query.vector, query.text.as_deref()) {
            (Some(vector), _) => vector.clone(),
            (None, Some(text)) => self.embed(text).await?,
            (None, None) => {
                return Err(SimstoreError::InvalidQuery(
                    "query needs text or a vector".to_string(),
                ))
            }
        };

        let collection = self.collection.read();
        let store = &collection.store;
        if store.is_empty() {
            return Ok(QueryResponse::empty());
        }
        store.check_vector(&query_vector)?;

        let weight = query
            .semantic_weight
            .unwrap_or(self.config.default_semantic_weight);
        let scorer = HybridScorer::new(weight, query.text.as_deref(), &collection.bm25);

        let clustered = &collection.clustered;
        let use_clustered = store.len() > self.config.index_threshold
            && clustered.state() != IndexState::Unbuilt
            && clustered.overflow_ratio() <= self.config.rebuild_overflow_ratio;

        let (candidates, index, approximate, stale): (Vec<&VectorRecord>, _, _, _) =
            if use_clustered {
                let probe = clustered.probe(&query_vector, self.config.probe_clusters);
                let records = probe
                    .candidate_ids
                    .iter()
                    .map(|id| store.expect_indexed(id))
                    .collect();
                (
                    records,
                    IndexKind::Clustered,
                    probe.approximate,
                    !clustered.overflow().is_empty(),
                )
            } else {
                (store.iter().collect(), IndexKind::Exact, false, false)
            };
        let candidate_count = candidates.len();

        let score = |r: &VectorRecord| scorer.score(&query_vector, r);
        let ranked = match &query.filter {
            None => ExactIndex::new().rank(candidates, score, query.k),
            Some(filter) => match filter.stage() {
                FilterStage::PreScoring => ExactIndex::new().rank(
                    candidates.into_iter().filter(|r| filter.matches(&r.metadata)),
                    score,
                    query.k,
                ),
                FilterStage::PostScoring => {
                    let all: Vec<ScoredId> = candidates
                        .into_iter()
                        .map(|r| ScoredId::new(r.id.clone(), score(r)))
                        .collect();
                    rank_all(all)
                        .into_iter()
                        .filter(|s| filter.matches(&store.expect_indexed(&s.id).metadata))
                        .take(query.k)
                        .collect()
                }
            },
        };

        let hits: Vec<QueryHit> = ranked
            .into_iter()
            .map(|s| QueryHit {
                metadata: store.expect_indexed(&s.id).metadata.clone(),
                id: s.id,
                score: s.score,
            })
            .collect();

        debug!(
            index = ?index,
            candidates = candidate_count,
            hits = hits.len(),
            hybrid = scorer.is_hybrid(),
            approximate,
            stale,
            "Query answered"
        );

        Ok(QueryResponse {
            hits,
            index,
            approximate,
            stale,
        })
    }

    /// Re-cluster every record, replacing the clustered index.
    ///
    /// `num_clusters` overrides the configured count; with neither set the
    /// count is `ceil(sqrt(n))`. Returns the number of clusters built.
    pub async fn rebuild_index(&self, num_clusters: Option<usize>) -> SimstoreResult<usize> {
        let _gate = self.writer.lock().await;
        self.rebuild_locked(num_clusters).await
    }

    /// Caller must hold the writer gate.
    async fn rebuild_locked(&self, num_clusters: Option<usize>) -> SimstoreResult<usize> {
        let (ids, vectors) = self.collection.read().columns();
        let records = ids.len();
        let k = num_clusters
            .or(self.config.num_clusters)
            .unwrap_or_else(|| ClusteredIndex::auto_cluster_count(records));
        if k == 0 {
            return Err(SimstoreError::Clustering(
                "cluster count must be at least 1".to_string(),
            ));
        }

        let max_iterations = self.config.max_iterations;
        let seed = self.config.seed;
        let index = tokio::task::spawn_blocking(move || {
            ClusteredIndex::build_from(ids, vectors, k, max_iterations, seed)
        })
        .await
        .map_err(|e| SimstoreError::Clustering(format!("rebuild task failed: {e}")))??;

        let clusters = index.clusters().len();
        self.collection.write().clustered = index;
        info!(records, clusters, "Clustered index rebuilt");
        Ok(clusters)
    }

    /// Rebuild when the collection outgrew exact search or the overflow
    /// bucket outgrew its share. Caller must hold the writer gate.
    async fn auto_rebuild(&self) {
        if !self.config.auto_rebuild {
            return;
        }
        let reason = {
            let collection = self.collection.read();
            let clustered = &collection.clustered;
            if collection.store.len() <= self.config.index_threshold {
                None
            } else if clustered.state() == IndexState::Unbuilt {
                Some("threshold crossed")
            } else if clustered.overflow_ratio() > self.config.rebuild_overflow_ratio {
                Some("overflow ratio exceeded")
            } else {
                None
            }
        };
        let Some(reason) = reason else {
            return;
        };

        debug!(reason, "Automatic index rebuild");
        if let Err(e) = self.rebuild_locked(None).await {
            warn!(error = %e, "Automatic rebuild failed; index left as is");
        }
    }

    /// Write every record to a JSONL snapshot at `path`.
    pub async fn export_snapshot(&self, path: &Path) -> SimstoreResult<usize> {
        let _gate = self.writer.lock().await;
        let records: Vec<VectorRecord> = self
            .collection
            .read()
            .store
            .sorted_records()
            .into_iter()
            .cloned()
            .collect();
        let written = snapshot::write_snapshot(path, &records).await?;
        info!(records = written, path = %path.display(), "Snapshot exported");
        Ok(written)
    }

    /// Replace every record with the contents of a JSONL snapshot.
    ///
    /// The snapshot is validated in full before anything changes: one
    /// dimension throughout, matching a configured dimension, no repeated
    /// ids. The clustered index is rebuilt when the collection is above the
    /// threshold; otherwise it starts unbuilt.
    pub async fn import_snapshot(&self, path: &Path) -> SimstoreResult<usize> {
        let records = snapshot::read_snapshot(path).await?;

        let mut fresh = Collection::new(self.config.dimension);
        for record in records {
            fresh.insert(record).map_err(|e| {
                SimstoreError::Snapshot(format!("Rejected snapshot {}: {}", path.display(), e))
            })?;
        }
        let count = fresh.store.len();

        let _gate = self.writer.lock().await;
        *self.collection.write() = fresh;
        info!(records = count, path = %path.display(), "Snapshot imported");

        if count > self.config.index_threshold {
            if let Err(e) = self.rebuild_locked(None).await {
                warn!(error = %e, "Index rebuild after import failed; using exact search");
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbedding;
    use crate::exact::SCORE_EPSILON;

    fn engine() -> QueryEngine {
        QueryEngine::new(EngineConfig::default(), Arc::new(LocalEmbedding::new(64))).unwrap()
    }

    fn small_threshold(threshold: usize) -> EngineConfig {
        EngineConfig {
            index_threshold: threshold,
            num_clusters: Some(4),
            probe_clusters: 4,
            ..EngineConfig::default()
        }
    }

    async fn ingest_vec(engine: &QueryEngine, id: &str, v: Vec<f32>) {
        engine
            .ingest(IngestRequest::vector(v).with_id(id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exact_example_scenario() {
        let engine = engine();
        ingest_vec(&engine, "a", vec![1.0, 0.0, 0.0]).await;
        ingest_vec(&engine, "b", vec![0.0, 1.0, 0.0]).await;

        let response = engine
            .query(Query::vector(vec![1.0, 0.0, 0.0]).with_k(1))
            .await
            .unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].id, "a");
        assert!((response.hits[0].score - 1.0).abs() < SCORE_EPSILON);
        assert!(response.hits[0].metadata.is_empty());
        assert_eq!(response.index, IndexKind::Exact);

        let response = engine
            .query(Query::vector(vec![0.7, 0.7, 0.0]).with_k(2))
            .await
            .unwrap();
        let ids: Vec<&str> = response.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((response.hits[0].score - response.hits[1].score).abs() < SCORE_EPSILON);
    }

    #[tokio::test]
    async fn test_invalid_k() {
        let engine = engine();
        ingest_vec(&engine, "a", vec![1.0, 0.0]).await;
        let err = engine
            .query(Query::vector(vec![1.0, 0.0]).with_k(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SimstoreError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_semantic_weight_out_of_range() {
        let engine = engine();
        ingest_vec(&engine, "a", vec![1.0, 0.0]).await;
        for weight in [7.5, -1.0, f64::NAN] {
            let err = engine
                .query(
                    Query::vector(vec![1.0, 0.0])
                        .with_text("x")
                        .with_semantic_weight(weight),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, SimstoreError::InvalidQuery(_)), "{weight}");
        }
        for weight in [0.0, 1.0] {
            let response = engine
                .query(
                    Query::vector(vec![1.0, 0.0])
                        .with_text("x")
                        .with_semantic_weight(weight),
                )
                .await
                .unwrap();
            assert_eq!(response.hits.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_non_finite_vectors_rejected() {
        let engine = engine();
        ingest_vec(&engine, "a", vec![1.0, 0.0]).await;
        let err = engine
            .ingest(IngestRequest::vector(vec![f32::NAN, 1.0]).with_id("bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, SimstoreError::InvalidQuery(_)));
        assert!(engine.get("bad").is_none());
        assert_eq!(engine.len(), 1);

        let err = engine
            .query(Query::vector(vec![f32::INFINITY, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, SimstoreError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_missing_text_and_vector() {
        let err = engine().query(Query::default()).await.unwrap_err();
        assert!(matches!(err, SimstoreError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty() {
        let response = engine().query(Query::text("anything")).await.unwrap();
        assert!(response.hits.is_empty());
    }

    #[tokio::test]
    async fn test_query_vector_dimension_mismatch() {
        let engine = engine();
        ingest_vec(&engine, "a", vec![1.0, 0.0, 0.0]).await;
        let err = engine
            .query(Query::vector(vec![1.0, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SimstoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_ingest_generates_id() {
        let engine = engine();
        let id = engine
            .ingest(IngestRequest::text("rust memory safety"))
            .await
            .unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        let record = engine.get(&id).unwrap();
        assert_eq!(record.raw_text, "rust memory safety");
        assert_eq!(record.vector.len(), 64);
    }

    #[tokio::test]
    async fn test_ingest_needs_content() {
        let err = engine().ingest(IngestRequest::default()).await.unwrap_err();
        assert!(matches!(err, SimstoreError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_duplicate_id_leaves_original() {
        let engine = engine();
        ingest_vec(&engine, "a", vec![1.0, 0.0]).await;
        let err = engine
            .ingest(IngestRequest::vector(vec![0.0, 1.0]).with_id("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, SimstoreError::DuplicateId(_)));
        assert_eq!(engine.get("a").unwrap().vector, vec![1.0, 0.0]);
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_from_results() {
        let engine = engine();
        ingest_vec(&engine, "a", vec![1.0, 0.0]).await;
        ingest_vec(&engine, "b", vec![0.9, 0.1]).await;

        assert!(engine.delete("a").await);
        assert!(!engine.delete("a").await);
        let response = engine.query(Query::vector(vec![1.0, 0.0])).await.unwrap();
        let ids: Vec<&str> = response.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_text_query_uses_cache() {
        let engine = engine();
        engine
            .ingest(IngestRequest::text("vector search engines").with_id("a"))
            .await
            .unwrap();
        engine.query(Query::text("vector search engines")).await.unwrap();
        let stats = engine.cache().stats();
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_auto_rebuild_after_threshold() {
        let engine =
            QueryEngine::new(small_threshold(8), Arc::new(LocalEmbedding::new(16))).unwrap();
        for i in 0..8 {
            ingest_vec(&engine, &format!("r{i}"), vec![i as f32 + 1.0, 1.0]).await;
        }
        assert_eq!(engine.index_state(), IndexState::Unbuilt);

        ingest_vec(&engine, "r8", vec![9.0, 1.0]).await;
        assert_eq!(engine.index_state(), IndexState::Built);
        assert_eq!(engine.stats().clusters, 4);

        let response = engine.query(Query::vector(vec![1.0, 1.0])).await.unwrap();
        assert_eq!(response.index, IndexKind::Clustered);
        assert!(!response.approximate);
    }

    #[tokio::test]
    async fn test_manual_rebuild_and_stats() {
        let engine = engine();
        for i in 0..12 {
            ingest_vec(&engine, &format!("r{i:02}"), vec![(i % 3) as f32, 1.0, 0.5]).await;
        }
        assert_eq!(engine.rebuild_index(Some(3)).await.unwrap(), 3);

        let stats = engine.stats();
        assert_eq!(stats.records, 12);
        assert_eq!(stats.dimension, Some(3));
        assert_eq!(stats.index_state, IndexState::Built);
        assert_eq!(stats.overflow, 0);
    }
}
