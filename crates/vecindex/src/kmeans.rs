//! Lloyd's k-means over flat row-major data.
//!
//! Used twice by the quantized index: once for the coarse inverted-file
//! centroids and once per subquantizer codebook. Seeded explicitly so
//! training is reproducible.

use crate::error::IndexError;

const KMEANS_ITERS: usize = 15;

/// Train `k` centroids over `n` rows of width `dim`. Returns a `k * dim`
/// flat centroid matrix. Fails when there are fewer rows than centroids.
pub(crate) fn train_kmeans(
    data: &[f32],
    n: usize,
    dim: usize,
    k: usize,
    seed: u64,
) -> Result<Vec<f32>, IndexError> {
    if n < k {
        return Err(IndexError::Training(format!(
            "need at least {k} samples for {k} centroids, have {n}"
        )));
    }
    debug_assert_eq!(data.len(), n * dim);

    let mut rng = fastrand::Rng::with_seed(seed);

    // Initialize from k distinct rows.
    let mut picks: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut picks);
    let mut centroids = vec![0f32; k * dim];
    for (c, &row) in picks[..k].iter().enumerate() {
        centroids[c * dim..(c + 1) * dim].copy_from_slice(&data[row * dim..(row + 1) * dim]);
    }

    let mut assignment = vec![0usize; n];
    for _ in 0..KMEANS_ITERS {
        let mut moved = false;
        for (row, slot) in assignment.iter_mut().enumerate() {
            let (best, _) = nearest_centroid(&centroids, k, dim, &data[row * dim..(row + 1) * dim]);
            if best != *slot {
                *slot = best;
                moved = true;
            }
        }

        let mut sums = vec![0f64; k * dim];
        let mut counts = vec![0usize; k];
        for (row, &c) in assignment.iter().enumerate() {
            counts[c] += 1;
            for d in 0..dim {
                sums[c * dim + d] += data[row * dim + d] as f64;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                // Reseed dead centroids from a random row.
                let row = rng.usize(..n);
                centroids[c * dim..(c + 1) * dim]
                    .copy_from_slice(&data[row * dim..(row + 1) * dim]);
                continue;
            }
            for d in 0..dim {
                centroids[c * dim + d] = (sums[c * dim + d] / counts[c] as f64) as f32;
            }
        }

        if !moved {
            break;
        }
    }

    Ok(centroids)
}

/// Index and squared L2 distance of the nearest centroid to `x`.
pub(crate) fn nearest_centroid(centroids: &[f32], k: usize, dim: usize, x: &[f32]) -> (usize, f32) {
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for c in 0..k {
        let d = squared_l2(&centroids[c * dim..(c + 1) * dim], x);
        if d < best_dist {
            best_dist = d;
            best = c;
        }
    }
    (best, best_dist)
}

pub(crate) fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_separated_clusters() {
        // Two tight clusters around (0,0) and (10,10).
        let mut data = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f32 * 0.01;
            data.extend_from_slice(&[jitter, jitter]);
            data.extend_from_slice(&[10.0 + jitter, 10.0 + jitter]);
        }
        let centroids = train_kmeans(&data, 40, 2, 2, 7).unwrap();

        let (near_origin, _) = nearest_centroid(&centroids, 2, 2, &[0.0, 0.0]);
        let (near_far, _) = nearest_centroid(&centroids, 2, 2, &[10.0, 10.0]);
        assert_ne!(near_origin, near_far);
    }

    #[test]
    fn too_few_samples_is_an_error() {
        let data = vec![0.0, 0.0, 1.0, 1.0];
        assert!(train_kmeans(&data, 2, 2, 3, 0).is_err());
    }

    #[test]
    fn seeded_training_is_deterministic() {
        let data: Vec<f32> = (0..64).map(|i| (i % 9) as f32).collect();
        let a = train_kmeans(&data, 16, 4, 4, 42).unwrap();
        let b = train_kmeans(&data, 16, 4, 4, 42).unwrap();
        assert_eq!(a, b);
    }
}
