//! Text → dense-vector port.
//!
//! The core only ever sees the [`Embedder`] trait; which implementation
//! backs it is wiring:
//!
//! - [`HttpEmbedder`]: OpenAI-style `/embeddings` endpoint over a pooled
//!   client, with bounded exponential-backoff retry on transient failures.
//! - [`StubEmbedder`]: deterministic hash-seeded vectors, no network.
//!   Identical texts map to identical vectors, distinct texts to
//!   effectively random unit vectors, which is exactly what index and
//!   router tests need.
//!
//! Embedding calls are suspension points; retries only happen here because
//! the operation is idempotent. Callers that own a deadline (the scan
//! pipeline) wrap these calls in their own timeout.

mod config;
mod error;
mod http;
mod retry;
mod stub;

pub use config::EmbedConfig;
pub use error::EmbedError;
pub use http::HttpEmbedder;
pub use retry::{retry_async, RetryConfig};
pub use stub::StubEmbedder;

use async_trait::async_trait;

/// Batch and single-query text embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
    /// Output dimensionality; constant for the lifetime of the embedder.
    fn dim(&self) -> usize;
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left alone.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_unit_norm() {
        let mut v = vec![3.0, 4.0];
        l2_normalize_in_place(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize_in_place(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
