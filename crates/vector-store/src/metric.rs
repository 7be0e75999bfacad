//! The distance metric shared by every search path.
//!
//! Distance is cosine distance, `1 - cos(q, p)`, bounded to `[0, 2]`.
//! Similarity is derived from distance in exactly one place,
//! [`similarity_from_distance`], as `1 - d / 2`.

use crate::error::{Result, VectorStoreError};
use crate::types::ScoredPassage;
use ndarray::{ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;

/// Largest value the metric can produce.
pub const MAX_DISTANCE: f32 = 2.0;

/// Cosine distance between two vectors of equal length.
///
/// Zero-norm inputs have cosine 0 and therefore distance 1.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    sanitize(1.0 - (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Monotonically decreasing map from distance to a `[0, 1]` similarity.
#[must_use]
pub fn similarity_from_distance(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    (1.0 - distance / MAX_DISTANCE).clamp(0.0, 1.0)
}

/// Distances for every row of `matrix` against `query` in one batched pass.
///
/// `matrix` is `N x D`, one stored embedding per row.
pub fn batch_cosine_distances(matrix: ArrayView2<'_, f32>, query: &[f32]) -> Result<Vec<f32>> {
    let dimension = matrix.ncols();
    if query.len() != dimension {
        return Err(VectorStoreError::InvalidDimension {
            expected: dimension,
            actual: query.len(),
        });
    }

    let query = ArrayView1::from(query);
    let query_norm = query.dot(&query).sqrt();
    let dots = matrix.dot(&query);
    let norms = matrix.map_axis(Axis(1), |row| row.dot(&row).sqrt());

    Ok(dots
        .iter()
        .zip(norms.iter())
        .map(|(&dot, &norm)| {
            if norm == 0.0 || query_norm == 0.0 {
                1.0
            } else {
                sanitize(1.0 - (dot / (norm * query_norm)).clamp(-1.0, 1.0))
            }
        })
        .collect())
}

/// Ascending distance, ties broken by passage id.
#[must_use]
pub fn compare_scored(a: &ScoredPassage, b: &ScoredPassage) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.passage.id.cmp(&b.passage.id))
}

/// Keeps the `k` best entries in ascending order without sorting the whole set.
#[must_use]
pub fn select_top_k(mut scored: Vec<ScoredPassage>, k: usize) -> Vec<ScoredPassage> {
    if k == 0 {
        return Vec::new();
    }
    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, compare_scored);
        scored.truncate(k);
    }
    scored.sort_by(compare_scored);
    scored
}

fn sanitize(distance: f32) -> f32 {
    if distance.is_nan() {
        f32::INFINITY
    } else {
        distance.clamp(0.0, MAX_DISTANCE)
    }
}
