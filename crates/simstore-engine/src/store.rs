use simstore_core::{Metadata, SimstoreError, SimstoreResult, Vector, VectorRecord};
use std::collections::HashMap;

/// Owns every [`VectorRecord`], keyed by id.
///
/// The store is the single source of truth; indexes only hold ids into it.
/// The first insert fixes the dimension unless one was given up front.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    dimension: Option<usize>,
    records: HashMap<String, VectorRecord>,
}

impl RecordStore {
    /// Create an empty store whose dimension is fixed by the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with a fixed dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            records: HashMap::new(),
        }
    }

    /// The store's fixed dimension, if one has been set.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Check a vector against the fixed dimension without mutating anything.
    pub fn check_dimension(&self, vector: &[f32]) -> SimstoreResult<()> {
        match self.dimension {
            Some(expected) if expected != vector.len() => Err(SimstoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            _ if vector.is_empty() => Err(SimstoreError::DimensionMismatch {
                expected: self.dimension.unwrap_or(1),
                actual: 0,
            }),
            _ => Ok(()),
        }
    }

    /// Check dimension, then reject NaN and infinite components.
    ///
    /// Non-finite values cannot be written to a JSON snapshot.
    pub fn check_vector(&self, vector: &[f32]) -> SimstoreResult<()> {
        self.check_dimension(vector)?;
        ensure_finite(vector)
    }

    /// Insert a new record built from its parts.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        vector: Vector,
        raw_text: impl Into<String>,
        metadata: Metadata,
    ) -> SimstoreResult<()> {
        self.insert_record(VectorRecord::new(id, vector, raw_text, metadata))
    }

    /// Insert a fully formed record.
    ///
    /// Rejects a wrong-length vector with `DimensionMismatch`, a non-finite
    /// one with `InvalidQuery` and an existing id with `DuplicateId`; on
    /// error the store is untouched.
    pub fn insert_record(&mut self, record: VectorRecord) -> SimstoreResult<()> {
        self.check_vector(&record.vector)?;
        if self.records.contains_key(&record.id) {
            return Err(SimstoreError::DuplicateId(record.id));
        }
        if self.dimension.is_none() {
            self.dimension = Some(record.vector.len());
        }
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Look up a record by id.
    pub fn get(&self, id: &str) -> Option<&VectorRecord> {
        self.records.get(id)
    }

    /// Whether a record with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Remove a record. Returns `true` if it was present.
    ///
    /// Callers are responsible for removing the id from every index in the
    /// same critical section.
    pub fn delete(&mut self, id: &str) -> bool {
        self.records.remove(id).is_some()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all records in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &VectorRecord> {
        self.records.values()
    }

    /// All records sorted by id, for stable exports.
    pub fn sorted_records(&self) -> Vec<&VectorRecord> {
        let mut records: Vec<&VectorRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Resolve an id an index handed out.
    ///
    /// Indexes are derived from the store inside the same lock, so an unknown
    /// id means the two have diverged and results would be wrong.
    pub fn expect_indexed(&self, id: &str) -> &VectorRecord {
        match self.records.get(id) {
            Some(record) => record,
            None => panic!("index references record '{id}' which is missing from the store"),
        }
    }
}

/// Fail with `InvalidQuery` if any component is NaN or infinite.
pub fn ensure_finite(vector: &[f32]) -> SimstoreResult<()> {
    if vector.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(SimstoreError::InvalidQuery(
            "vector contains non-finite values".to_string(),
        ))
    }
}
