use async_trait::async_trait;
use fxhash::hash64;

use crate::{l2_normalize_in_place, EmbedError, Embedder};

/// Deterministic no-network [`Embedder`].
///
/// Each text seeds a splitmix-style generator, so distinct texts produce
/// independent pseudo-random unit vectors while identical texts always map
/// to the same point. High-dimensional random unit vectors are close to
/// orthogonal, which makes exact-text recall through the vector index
/// reliable in tests.
pub struct StubEmbedder {
    dim: usize,
}

impl StubEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn splitmix(state: &mut u64) -> u64 {
        *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = *state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut state = hash64(text.as_bytes());
        let mut v = vec![0f32; self.dim];
        for value in v.iter_mut() {
            let bits = Self::splitmix(&mut state);
            *value = (bits as f64 / u64::MAX as f64) as f32 * 2.0 - 1.0;
        }
        l2_normalize_in_place(&mut v);
        v
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new(1536)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_per_text() {
        let e = StubEmbedder::new(64);
        let a = e.embed("paracetamol").await.unwrap();
        let b = e.embed("paracetamol").await.unwrap();
        let c = e.embed("amoxicillin").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn vectors_are_unit_norm() {
        let e = StubEmbedder::new(128);
        let v = e.embed("anything").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn distinct_texts_are_nearly_orthogonal() {
        let e = StubEmbedder::new(512);
        let a = e.embed("first product name").await.unwrap();
        let b = e.embed("completely different").await.unwrap();
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!(dot.abs() < 0.3, "dot was {dot}");
    }
}
