use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A dense embedding vector.
pub type Vector = Vec<f32>;

/// Metadata attached to a record. Keys are unique; order is irrelevant.
pub type Metadata = HashMap<String, MetadataValue>;

/// A metadata value: string, number, or boolean.
///
/// Serialized untagged, so JSON `"a"`, `1.5` and `true` map directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A boolean flag.
    Bool(bool),
    /// A numeric value.
    Number(f64),
    /// A string value.
    String(String),
}

impl MetadataValue {
    /// Returns the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a command-line style literal: `true`/`false`, a number, or a string.
    pub fn parse_literal(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => raw
                .parse::<f64>()
                .map(Self::Number)
                .unwrap_or_else(|_| Self::String(raw.to_string())),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A single item stored in the similarity store.
///
/// Records are immutable once ingested; a changed embedding requires a
/// delete followed by a fresh ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Stable identifier, unique within a store.
    pub id: String,
    /// Embedding vector; its length equals the store dimension.
    pub vector: Vector,
    /// Original source text, used for lexical scoring and display.
    pub raw_text: String,
    /// Arbitrary key-value metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// UTC timestamp of ingestion.
    pub created_at: DateTime<Utc>,
}

impl VectorRecord {
    /// Creates a record stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        vector: Vector,
        raw_text: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            vector,
            raw_text: raw_text.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Dimension of this record's vector.
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}
