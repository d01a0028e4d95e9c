//! K-means clustering used as the coarse quantizer of the clustered index.
//!
//! Cosine similarity is the distance metric; centroids are kept unit-length.
//! Initialization is k-means++ driven by a seeded RNG, so a given input and
//! seed always produce the same partition.

use crate::exact::cosine_similarity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simstore_core::{SimstoreError, SimstoreResult, Vector};

/// Squared-distance mass below which every point already sits on a centroid.
const EPSILON: f64 = 1e-12;

/// Output of [`kmeans`].
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Unit-length centroids, one per cluster.
    pub centroids: Vec<Vector>,
    /// Cluster index for each input vector, in input order.
    pub assignments: Vec<usize>,
    /// Iterations run before stopping.
    pub iterations: usize,
    /// Whether the loop stopped because assignments stabilized.
    pub converged: bool,
}

/// Partition `vectors` into `k` clusters.
///
/// Repeats assignment and centroid update until no assignment changes or
/// `max_iterations` is reached. `k` larger than the input is an error; the
/// caller clamps.
pub fn kmeans(
    vectors: &[&[f32]],
    k: usize,
    max_iterations: usize,
    seed: u64,
) -> SimstoreResult<KMeansResult> {
    if vectors.is_empty() {
        return Err(SimstoreError::Clustering(
            "cannot cluster an empty vector set".to_string(),
        ));
    }
    if k == 0 || k > vectors.len() {
        return Err(SimstoreError::Clustering(format!(
            "cluster count {k} must be between 1 and {}",
            vectors.len()
        )));
    }
    let dimension = vectors[0].len();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(SimstoreError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = init_plus_plus(vectors, k, &mut rng);
    let mut assignments = assign_all(vectors, &centroids);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations.max(1) {
        iterations += 1;
        centroids = update_centroids(vectors, &assignments, k, &mut rng);
        let next = assign_all(vectors, &centroids);
        if next == assignments {
            converged = true;
            break;
        }
        assignments = next;
    }

    if !converged {
        tracing::debug!(iterations, k, "k-means stopped at iteration cap");
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
        converged,
    })
}

/// Index of the most similar centroid; ties go to the lower index.
pub fn nearest_centroid(vector: &[f32], centroids: &[Vector]) -> usize {
    let mut best = 0;
    let mut best_sim = f64::NEG_INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let sim = cosine_similarity(vector, centroid);
        if sim > best_sim {
            best_sim = sim;
            best = i;
        }
    }
    best
}

fn assign_all(vectors: &[&[f32]], centroids: &[Vector]) -> Vec<usize> {
    vectors
        .iter()
        .map(|v| nearest_centroid(v, centroids))
        .collect()
}

/// K-means++: each next centroid is drawn with probability proportional to
/// its squared cosine distance from the closest centroid chosen so far.
fn init_plus_plus(vectors: &[&[f32]], k: usize, rng: &mut StdRng) -> Vec<Vector> {
    let mut centroids: Vec<Vector> = Vec::with_capacity(k);
    let mut chosen = vec![false; vectors.len()];

    let first = rng.random_range(0..vectors.len());
    chosen[first] = true;
    centroids.push(normalized(vectors[first]));

    while centroids.len() < k {
        let distances: Vec<f64> = vectors
            .iter()
            .map(|v| {
                let d = centroids
                    .iter()
                    .map(|c| 1.0 - cosine_similarity(v, c))
                    .fold(f64::MAX, f64::min)
                    .max(0.0);
                d * d
            })
            .collect();
        let total: f64 = distances.iter().sum();

        let pick = if total < EPSILON {
            // Everything coincides with a centroid; take unchosen points in order.
            chosen.iter().position(|c| !c)
        } else {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut pick = None;
            for (i, d) in distances.iter().enumerate() {
                cumulative += d;
                if cumulative >= target && *d > 0.0 {
                    pick = Some(i);
                    break;
                }
            }
            pick.or_else(|| distances.iter().rposition(|d| *d > 0.0))
        };

        let idx = pick.unwrap_or(0);
        chosen[idx] = true;
        centroids.push(normalized(vectors[idx]));
    }

    centroids
}

/// Mean of each cluster's members, normalized. An empty cluster is reseeded
/// from a random input vector.
fn update_centroids(
    vectors: &[&[f32]],
    assignments: &[usize],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vector> {
    let dimension = vectors[0].len();
    let mut sums = vec![vec![0.0f64; dimension]; k];
    let mut sizes = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments) {
        for (acc, &x) in sums[cluster].iter_mut().zip(vector.iter()) {
            *acc += f64::from(x);
        }
        sizes[cluster] += 1;
    }

    sums.into_iter()
        .zip(sizes)
        .map(|(sum, size)| {
            if size == 0 {
                let idx = rng.random_range(0..vectors.len());
                normalized(vectors[idx])
            } else {
                let mean: Vector = sum.iter().map(|s| (s / size as f64) as f32).collect();
                normalized(&mean)
            }
        })
        .collect()
}

fn normalized(vector: &[f32]) -> Vector {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter().map(|x| x / norm).collect()
    } else {
        vector.to_vec()
    }
}
