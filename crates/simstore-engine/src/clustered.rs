//! Approximate index that routes queries to the nearest k-means clusters.
//!
//! Mutations after a build never re-cluster. New ids go to an overflow
//! bucket that every search scans in full, and the index turns `Stale`
//! until the next [`ClusteredIndex::build`].

use crate::exact::{cosine_similarity, ExactIndex, ScoredId};
use crate::kmeans::kmeans;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use simstore_core::{SimstoreResult, Vector};
use std::collections::{BTreeSet, HashMap};

/// Upper bound for automatically chosen cluster counts.
pub const MAX_AUTO_CLUSTERS: usize = 256;

/// Lifecycle of a [`ClusteredIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    /// No clustering has been computed.
    Unbuilt,
    /// Clusters reflect every record.
    Built,
    /// Records changed since the last build.
    Stale,
}

/// One partition of the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Unit-length mean of the members at build time.
    pub centroid: Vector,
    /// Ids assigned to this cluster.
    pub member_ids: BTreeSet<String>,
}

/// Candidate ids selected by probing, plus whether anything was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    /// Members of the probed clusters and the whole overflow bucket, sorted.
    pub candidate_ids: Vec<String>,
    /// At least one non-empty cluster was not probed.
    pub approximate: bool,
}

/// Hits from [`ClusteredIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredSearch {
    /// Best-first hits.
    pub hits: Vec<ScoredId>,
    /// Some true neighbors may live in unprobed clusters.
    pub approximate: bool,
    /// The overflow bucket was non-empty.
    pub stale: bool,
}

/// Inverted-file style index over a [`RecordStore`]. Holds ids only.
#[derive(Debug, Clone)]
pub struct ClusteredIndex {
    state: IndexState,
    clusters: Vec<Cluster>,
    assignments: HashMap<String, usize>,
    overflow: BTreeSet<String>,
}

impl Default for ClusteredIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusteredIndex {
    /// An unbuilt index.
    pub fn new() -> Self {
        Self {
            state: IndexState::Unbuilt,
            clusters: Vec::new(),
            assignments: HashMap::new(),
            overflow: BTreeSet::new(),
        }
    }

    /// Cluster count for `n` records when none is configured.
    pub fn auto_cluster_count(n: usize) -> usize {
        ((n as f64).sqrt().ceil() as usize).clamp(1, MAX_AUTO_CLUSTERS)
    }

    /// Partition every record in `store` into `num_clusters` groups.
    ///
    /// The count is clamped to the number of records. An empty store yields
    /// a `Built` index with no clusters.
    pub fn build(
        store: &RecordStore,
        num_clusters: usize,
        max_iterations: usize,
        seed: u64,
    ) -> SimstoreResult<Self> {
        let records = store.sorted_records();
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let vectors: Vec<Vector> = records.iter().map(|r| r.vector.clone()).collect();
        Self::build_from(ids, vectors, num_clusters, max_iterations, seed)
    }

    /// Build from owned `(ids, vectors)` columns, e.g. a snapshot taken
    /// outside the store lock.
    pub fn build_from(
        ids: Vec<String>,
        vectors: Vec<Vector>,
        num_clusters: usize,
        max_iterations: usize,
        seed: u64,
    ) -> SimstoreResult<Self> {
        let mut index = Self::new();
        index.state = IndexState::Built;
        if ids.is_empty() {
            return Ok(index);
        }

        let k = num_clusters.clamp(1, ids.len());
        if k != num_clusters {
            tracing::warn!(
                requested = num_clusters,
                used = k,
                "Cluster count clamped to record count"
            );
        }

        let refs: Vec<&[f32]> = vectors.iter().map(Vec::as_slice).collect();
        let result = kmeans(&refs, k, max_iterations, seed)?;

        index.clusters = result
            .centroids
            .into_iter()
            .map(|centroid| Cluster {
                centroid,
                member_ids: BTreeSet::new(),
            })
            .collect();
        for (id, cluster) in ids.into_iter().zip(result.assignments) {
            index.clusters[cluster].member_ids.insert(id.clone());
            index.assignments.insert(id, cluster);
        }

        tracing::debug!(
            clusters = k,
            iterations = result.iterations,
            converged = result.converged,
            "k-means finished"
        );
        Ok(index)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// The clusters from the last build.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Ids inserted since the last build.
    pub fn overflow(&self) -> &BTreeSet<String> {
        &self.overflow
    }

    /// Number of ids tracked, clustered or overflowed.
    pub fn len(&self) -> usize {
        self.assignments.len() + self.overflow.len()
    }

    /// Whether the index tracks no ids.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Share of tracked ids sitting in the overflow bucket.
    pub fn overflow_ratio(&self) -> f64 {
        match self.len() {
            0 => 0.0,
            n => self.overflow.len() as f64 / n as f64,
        }
    }

    /// Track a new id. No-op on an unbuilt index.
    pub fn insert(&mut self, id: &str) {
        if self.state == IndexState::Unbuilt {
            return;
        }
        self.overflow.insert(id.to_string());
        self.state = IndexState::Stale;
    }

    /// Forget an id wherever it lives. Returns `true` if it was tracked.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.state == IndexState::Unbuilt {
            return false;
        }
        let removed = if let Some(cluster) = self.assignments.remove(id) {
            self.clusters[cluster].member_ids.remove(id);
            true
        } else {
            self.overflow.remove(id)
        };
        if removed {
            self.state = IndexState::Stale;
        }
        removed
    }

    /// Pick candidates from the `probe_clusters` clusters closest to `query`.
    ///
    /// Clusters rank by centroid similarity, ties on lower cluster index.
    /// The overflow bucket is always included.
    pub fn probe(&self, query: &[f32], probe_clusters: usize) -> ProbeResult {
        let mut ranked: Vec<(usize, f64)> = self
            .clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.member_ids.is_empty())
            .map(|(i, c)| (i, cosine_similarity(query, &c.centroid)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let approximate = ranked.len() > probe_clusters;
        let mut candidate_ids: Vec<String> = ranked
            .iter()
            .take(probe_clusters)
            .flat_map(|(i, _)| self.clusters[*i].member_ids.iter().cloned())
            .chain(self.overflow.iter().cloned())
            .collect();
        candidate_ids.sort();

        ProbeResult {
            candidate_ids,
            approximate,
        }
    }

    /// Top `k` by cosine similarity among the probed candidates.
    pub fn search(
        &self,
        store: &RecordStore,
        query: &[f32],
        k: usize,
        probe_clusters: usize,
    ) -> ClusteredSearch {
        let probe = self.probe(query, probe_clusters);
        let ids: Vec<&str> = probe.candidate_ids.iter().map(String::as_str).collect();
        ClusteredSearch {
            hits: ExactIndex::new().search(store, query, Some(&ids), k),
            approximate: probe.approximate,
            stale: !self.overflow.is_empty(),
        }
    }
}
