use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::kmeans::squared_l2;

/// Brute-force exact index: every query scans every stored vector.
///
/// Slow past a few hundred thousand rows but exact, and the fallback for
/// every failure path in the quantized index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    ids: Vec<i64>,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn ntotal(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn add(&mut self, data: &[f32], ids: &[i64]) -> Result<(), IndexError> {
        let n = ids.len();
        if data.len() != n * self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: n * self.dim,
                got: data.len(),
            });
        }
        self.vectors.extend_from_slice(data);
        self.ids.extend_from_slice(ids);
        Ok(())
    }

    /// Top-k by squared L2 distance, ascending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        let mut scored: Vec<(i64, f32)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(row, &id)| {
                let v = &self.vectors[row * self.dim..(row + 1) * self.dim];
                (id, squared_l2(query, v))
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_nearest_first() {
        let mut idx = FlatIndex::new(2);
        idx.add(&[0.0, 0.0, 1.0, 1.0, 5.0, 5.0], &[10, 11, 12]).unwrap();

        let hits = idx.search(&[0.9, 0.9], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 11);
        assert_eq!(hits[1].0, 10);
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn k_larger_than_total_returns_all() {
        let mut idx = FlatIndex::new(1);
        idx.add(&[1.0, 2.0], &[1, 2]).unwrap();
        assert_eq!(idx.search(&[0.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let mut idx = FlatIndex::new(3);
        assert!(idx.add(&[1.0, 2.0], &[1]).is_err());
        assert!(idx.search(&[1.0], 1).is_err());
    }
}
