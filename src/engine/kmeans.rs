//! K-means clustering for coarse quantizer fitting.
//!
//! Lloyd's algorithm with k-means++ initialization. Assignment steps run
//! in parallel; centroid updates are sequential. Operates on flat
//! row-major data to match the engine layer's memory layout.

use rand::Rng;
use rayon::prelude::*;

use super::l2_squared;

const CONVERGENCE_EPS: f32 = 1e-3;

/// Fits `k` centroids to `n = vectors.len() / dim` training rows.
///
/// Returns a flat `k * dim` centroid table. Callers guarantee `k >= 1`
/// and `k <= n`.
pub(crate) fn fit_centroids(vectors: &[f32], dim: usize, k: usize, max_iters: usize) -> Vec<f32> {
    let n = vectors.len() / dim;
    debug_assert!(k >= 1 && k <= n);

    let mut centroids = plus_plus_init(vectors, dim, k);

    for _iter in 0..max_iters {
        let assignments: Vec<usize> = vectors
            .par_chunks(dim)
            .map(|row| nearest_centroid(row, &centroids, dim).0)
            .collect();

        let mut sums = vec![0.0f32; k * dim];
        let mut counts = vec![0usize; k];
        for (row, &cluster) in vectors.chunks_exact(dim).zip(assignments.iter()) {
            counts[cluster] += 1;
            let sum = &mut sums[cluster * dim..(cluster + 1) * dim];
            for (s, v) in sum.iter_mut().zip(row.iter()) {
                *s += v;
            }
        }

        let mut shift = 0.0f32;
        for c in 0..k {
            if counts[c] == 0 {
                // Empty cluster keeps its previous centroid
                continue;
            }
            let inv = 1.0 / counts[c] as f32;
            let old = centroids[c * dim..(c + 1) * dim].to_vec();
            for (dst, &s) in centroids[c * dim..(c + 1) * dim]
                .iter_mut()
                .zip(sums[c * dim..(c + 1) * dim].iter())
            {
                *dst = s * inv;
            }
            shift += l2_squared(&old, &centroids[c * dim..(c + 1) * dim]);
        }

        if shift < CONVERGENCE_EPS {
            break;
        }
    }

    centroids
}

/// Index and squared distance of the centroid nearest to `row`.
pub(crate) fn nearest_centroid(row: &[f32], centroids: &[f32], dim: usize) -> (usize, f32) {
    let mut best = (0usize, f32::MAX);
    for (idx, centroid) in centroids.chunks_exact(dim).enumerate() {
        let d = l2_squared(row, centroid);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best
}

/// k-means++ seeding: each new centroid is drawn with probability
/// proportional to its squared distance from the existing ones.
fn plus_plus_init(vectors: &[f32], dim: usize, k: usize) -> Vec<f32> {
    let n = vectors.len() / dim;
    let mut rng = rand::thread_rng();
    let mut centroids = Vec::with_capacity(k * dim);

    let first = rng.gen_range(0..n);
    centroids.extend_from_slice(&vectors[first * dim..(first + 1) * dim]);

    while centroids.len() < k * dim {
        let distances: Vec<f32> = vectors
            .par_chunks(dim)
            .map(|row| nearest_centroid(row, &centroids, dim).1)
            .collect();

        let total: f32 = distances.iter().sum();
        if total <= 0.0 {
            // All remaining rows coincide with a centroid; pick any
            let idx = rng.gen_range(0..n);
            centroids.extend_from_slice(&vectors[idx * dim..(idx + 1) * dim]);
            continue;
        }

        let mut r = rng.gen_range(0.0..total);
        let mut chosen = n - 1;
        for (i, &d) in distances.iter().enumerate() {
            r -= d;
            if r <= 0.0 {
                chosen = i;
                break;
            }
        }
        centroids.extend_from_slice(&vectors[chosen * dim..(chosen + 1) * dim]);
    }

    centroids
}
