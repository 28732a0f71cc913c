//! Inverted file with product quantization.
//!
//! Structure mirrors the classic IVF+PQ layout: a coarse k-means quantizer
//! routes each vector to one of `nlist` inverted lists, and the residual
//! against the coarse centroid is product-quantized into `pq_m` one-byte
//! codes. Search probes the `nprobe` closest lists and scores candidates
//! with per-query ADC lookup tables, so stored vectors are never
//! reconstructed.
//!
//! Distances are approximate squared L2. Construction only succeeds through
//! [`IvfPqIndex::train`], so an instance of this type is trained by
//! definition.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IndexError;
use crate::kmeans::{nearest_centroid, squared_l2, train_kmeans};

/// Codebook entries per subquantizer (8-bit codes).
const PQ_KS: usize = 256;

const COARSE_SEED: u64 = 42;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfPqIndex {
    dim: usize,
    nlist: usize,
    pq_m: usize,
    dsub: usize,
    nprobe: usize,
    /// `nlist * dim` coarse centroids.
    coarse: Vec<f32>,
    /// `pq_m * PQ_KS * dsub` codebook entries over residuals.
    codebooks: Vec<f32>,
    list_ids: Vec<Vec<i64>>,
    /// Per list: `len * pq_m` codes.
    list_codes: Vec<Vec<u8>>,
}

impl IvfPqIndex {
    /// Train coarse and residual quantizers on `n` rows of width `dim`.
    ///
    /// Requires `dim % pq_m == 0` and at least [`PQ_KS`] samples; the caller
    /// is expected to fall back to the flat index when this fails.
    pub fn train(
        data: &[f32],
        n: usize,
        dim: usize,
        nlist: usize,
        pq_m: usize,
        nprobe: usize,
    ) -> Result<Self, IndexError> {
        if pq_m == 0 || dim % pq_m != 0 {
            return Err(IndexError::Training(format!(
                "dim {dim} not divisible into {pq_m} subquantizers"
            )));
        }
        if n < PQ_KS {
            return Err(IndexError::Training(format!(
                "need at least {PQ_KS} training samples, have {n}"
            )));
        }
        let dsub = dim / pq_m;

        debug!(n, dim, nlist, pq_m, "training ivfpq");
        let coarse = train_kmeans(data, n, dim, nlist, COARSE_SEED)?;

        // Residuals of every training point against its coarse centroid.
        let mut residuals = vec![0f32; n * dim];
        for row in 0..n {
            let x = &data[row * dim..(row + 1) * dim];
            let (cell, _) = nearest_centroid(&coarse, nlist, dim, x);
            let c = &coarse[cell * dim..(cell + 1) * dim];
            for d in 0..dim {
                residuals[row * dim + d] = x[d] - c[d];
            }
        }

        // One codebook per subquantizer over the residual sub-slices.
        let mut codebooks = vec![0f32; pq_m * PQ_KS * dsub];
        let mut sub = vec![0f32; n * dsub];
        for m in 0..pq_m {
            for row in 0..n {
                sub[row * dsub..(row + 1) * dsub].copy_from_slice(
                    &residuals[row * dim + m * dsub..row * dim + (m + 1) * dsub],
                );
            }
            let book = train_kmeans(&sub, n, dsub, PQ_KS, COARSE_SEED + 1 + m as u64)?;
            codebooks[m * PQ_KS * dsub..(m + 1) * PQ_KS * dsub].copy_from_slice(&book);
        }

        Ok(Self {
            dim,
            nlist,
            pq_m,
            dsub,
            nprobe: nprobe.max(1),
            coarse,
            codebooks,
            list_ids: vec![Vec::new(); nlist],
            list_codes: vec![Vec::new(); nlist],
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    pub fn ntotal(&self) -> usize {
        self.list_ids.iter().map(Vec::len).sum()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.list_ids.iter().flatten().copied().collect()
    }

    pub fn set_nprobe(&mut self, nprobe: usize) {
        self.nprobe = nprobe.max(1);
    }

    pub fn add(&mut self, data: &[f32], ids: &[i64]) -> Result<(), IndexError> {
        let n = ids.len();
        if data.len() != n * self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: n * self.dim,
                got: data.len(),
            });
        }
        for row in 0..n {
            let x = &data[row * self.dim..(row + 1) * self.dim];
            let (cell, _) = nearest_centroid(&self.coarse, self.nlist, self.dim, x);
            let c = &self.coarse[cell * self.dim..(cell + 1) * self.dim];
            let codes = self.encode_residual(x, c);
            self.list_ids[cell].push(ids[row]);
            self.list_codes[cell].extend_from_slice(&codes);
        }
        Ok(())
    }

    fn encode_residual(&self, x: &[f32], centroid: &[f32]) -> Vec<u8> {
        let mut residual = vec![0f32; self.dim];
        for d in 0..self.dim {
            residual[d] = x[d] - centroid[d];
        }
        let mut codes = vec![0u8; self.pq_m];
        for m in 0..self.pq_m {
            let sub = &residual[m * self.dsub..(m + 1) * self.dsub];
            let book = &self.codebooks[m * PQ_KS * self.dsub..(m + 1) * PQ_KS * self.dsub];
            let (best, _) = nearest_centroid(book, PQ_KS, self.dsub, sub);
            codes[m] = best as u8;
        }
        codes
    }

    /// Approximate top-k by squared L2, probing the `nprobe` nearest lists.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        if self.ntotal() == 0 {
            return Ok(Vec::new());
        }

        let mut cells: Vec<(usize, f32)> = (0..self.nlist)
            .map(|c| {
                (
                    c,
                    squared_l2(&self.coarse[c * self.dim..(c + 1) * self.dim], query),
                )
            })
            .collect();
        cells.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        cells.truncate(self.nprobe);

        let mut hits: Vec<(i64, f32)> = Vec::new();
        let mut table = vec![0f32; self.pq_m * PQ_KS];
        for &(cell, _) in &cells {
            if self.list_ids[cell].is_empty() {
                continue;
            }
            // ADC table for this cell: distance from the query residual's
            // sub-slices to every codebook entry.
            let centroid = &self.coarse[cell * self.dim..(cell + 1) * self.dim];
            for m in 0..self.pq_m {
                let q_sub: Vec<f32> = (m * self.dsub..(m + 1) * self.dsub)
                    .map(|d| query[d] - centroid[d])
                    .collect();
                let book = &self.codebooks[m * PQ_KS * self.dsub..(m + 1) * PQ_KS * self.dsub];
                for code in 0..PQ_KS {
                    table[m * PQ_KS + code] =
                        squared_l2(&q_sub, &book[code * self.dsub..(code + 1) * self.dsub]);
                }
            }

            let codes = &self.list_codes[cell];
            for (slot, &id) in self.list_ids[cell].iter().enumerate() {
                let mut dist = 0f32;
                for m in 0..self.pq_m {
                    dist += table[m * PQ_KS + codes[slot * self.pq_m + m] as usize];
                }
                hits.push((id, dist));
            }
        }

        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clustered synthetic corpus: `per_cluster` points around each of four
    /// well-separated anchors in `dim` dimensions.
    fn clustered(dim: usize, per_cluster: usize) -> (Vec<f32>, Vec<i64>) {
        let anchors = [0.0f32, 20.0, 40.0, 60.0];
        let mut data = Vec::new();
        let mut ids = Vec::new();
        let mut rng = fastrand::Rng::with_seed(9);
        for (a, &anchor) in anchors.iter().enumerate() {
            for i in 0..per_cluster {
                for _ in 0..dim {
                    data.push(anchor + rng.f32() * 0.5);
                }
                ids.push((a * per_cluster + i) as i64);
            }
        }
        (data, ids)
    }

    #[test]
    fn trained_index_routes_queries_to_right_cluster() {
        let dim = 8;
        let (data, ids) = clustered(dim, 80); // 320 samples ≥ 256
        let mut idx = IvfPqIndex::train(&data, ids.len(), dim, 8, 4, 8).unwrap();
        idx.add(&data, &ids).unwrap();
        assert_eq!(idx.ntotal(), 320);

        // Query near the third anchor (40.0): all top hits must come from
        // cluster 2 (ids 160..240).
        let query = vec![40.1f32; dim];
        let hits = idx.search(&query, 5).unwrap();
        assert_eq!(hits.len(), 5);
        for (id, _) in hits {
            assert!((160..240).contains(&id), "id {id} from wrong cluster");
        }
    }

    #[test]
    fn distances_ascend() {
        let dim = 8;
        let (data, ids) = clustered(dim, 80);
        let mut idx = IvfPqIndex::train(&data, ids.len(), dim, 8, 4, 8).unwrap();
        idx.add(&data, &ids).unwrap();
        let hits = idx.search(&vec![0.2f32; dim], 10).unwrap();
        for pair in hits.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn indivisible_dim_fails_training() {
        let data = vec![0f32; 300 * 10];
        let err = IvfPqIndex::train(&data, 300, 10, 4, 3, 4).unwrap_err();
        assert!(matches!(err, IndexError::Training(_)));
    }

    #[test]
    fn too_few_samples_fails_training() {
        let data = vec![0f32; 100 * 8];
        assert!(IvfPqIndex::train(&data, 100, 8, 4, 4, 4).is_err());
    }

    #[test]
    fn empty_index_searches_empty() {
        let (data, ids) = clustered(8, 80);
        let idx = IvfPqIndex::train(&data, ids.len(), 8, 8, 4, 8).unwrap();
        assert!(idx.search(&vec![0f32; 8], 5).unwrap().is_empty());
    }
}
