//! In-memory embedding similarity store.
//!
//! Records carry a vector, their source text and metadata. Queries rank
//! them by cosine similarity, optionally fused with BM25 lexical relevance,
//! through either an exhaustive scan or a k-means clustered index.
//!
//! # Main types
//!
//! - [`QueryEngine`]: Ingest, query, delete, rebuild and snapshot operations.
//! - [`EmbeddingCache`]: Bounded LRU cache of embeddings with single-flight misses.
//! - [`EmbeddingProvider`]: Trait for computing text embeddings.
//! - [`LocalEmbedding`]: Deterministic feature-hashing embedder.
//! - [`ExactIndex`]: Brute-force cosine search.
//! - [`ClusteredIndex`]: Approximate search over k-means partitions.
//! - [`HybridScorer`]: Weighted cosine and BM25 fusion.
//! - [`MetadataFilter`]: Closed filter language over record metadata.

/// BM25 inverted index for lexical relevance.
pub mod bm25;
/// Embedding cache keyed by content hash.
pub mod cache;
/// K-means clustered index.
pub mod clustered;
/// Embedding provider trait and local implementation.
pub mod embedding;
/// Query engine tying store, cache and indexes together.
pub mod engine;
/// Exhaustive cosine search and ranking helpers.
pub mod exact;
/// Metadata filters.
pub mod filter;
/// Hybrid semantic and lexical scoring.
pub mod hybrid;
/// Seeded k-means with an iteration cap.
pub mod kmeans;
/// JSONL snapshot persistence.
pub mod snapshot;
/// Record store, the source of truth for all indexes.
pub mod store;

pub use bm25::Bm25Index;
pub use cache::{CacheStats, ContentHash, EmbeddingCache};
pub use clustered::{ClusteredIndex, IndexState};
pub use embedding::{EmbeddingProvider, LocalEmbedding};
pub use engine::{
    EngineStats, IndexKind, IngestRequest, Query, QueryEngine, QueryHit, QueryResponse,
};
pub use exact::{cosine_similarity, ExactIndex, ScoredId, SCORE_EPSILON};
pub use filter::{FilterStage, MetadataFilter};
pub use hybrid::HybridScorer;
pub use store::RecordStore;
