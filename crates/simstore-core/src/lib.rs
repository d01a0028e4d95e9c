//! Core types and error definitions for simstore.
//!
//! This crate provides the foundational types shared by the engine and the
//! command-line front end: error handling, the record data model, and the
//! engine configuration.
//!
//! # Main types
//!
//! - [`SimstoreError`]: Unified error enum for every simstore operation.
//! - [`SimstoreResult`]: Convenience alias for `Result<T, SimstoreError>`.
//! - [`VectorRecord`]: A stored item: id, vector, raw text, and metadata.
//! - [`MetadataValue`]: Closed value type for record metadata.
//! - [`EngineConfig`]: Tunables for caching, indexing, and scoring.

/// Engine configuration loaded from TOML.
pub mod config;
/// Record data model.
pub mod record;

pub use config::EngineConfig;
pub use record::{Metadata, MetadataValue, Vector, VectorRecord};

// --- Error types ---

/// Top-level error type for simstore.
///
/// Absence of a record is not an error: lookups return `Option` and deletes
/// return `bool`.
#[derive(Debug, thiserror::Error)]
pub enum SimstoreError {
    /// A vector's length differs from the store's fixed dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension fixed for the store.
        expected: usize,
        /// The length of the offending vector.
        actual: usize,
    },

    /// The upstream embedding computation failed or timed out.
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// A query or ingest request was malformed: `k < 1`, a weight outside
    /// [0, 1], non-finite vector components, or neither text nor vector.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A record with this id already exists; records are immutable.
    #[error("Duplicate record id: {0}")]
    DuplicateId(String),

    /// The clustered index could not be built.
    #[error("Clustering error: {0}")]
    Clustering(String),

    /// A snapshot file could not be read or written.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`SimstoreError`].
pub type SimstoreResult<T> = Result<T, SimstoreError>;
