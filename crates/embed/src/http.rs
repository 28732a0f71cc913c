use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::time::Duration;

use crate::{retry_async, EmbedConfig, EmbedError, Embedder};

// Process-wide pooled client; per-request timeouts come from config.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(16)
        .build()
        .expect("default reqwest client")
});

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

/// [`Embedder`] backed by an OpenAI-style `/embeddings` endpoint.
pub struct HttpEmbedder {
    cfg: EmbedConfig,
}

impl HttpEmbedder {
    pub fn new(cfg: EmbedConfig) -> Result<Self, EmbedError> {
        if cfg.api_url.trim().is_empty() {
            return Err(EmbedError::InvalidConfig("api_url must not be empty".into()));
        }
        if cfg.dim == 0 {
            return Err(EmbedError::InvalidConfig("dim must be positive".into()));
        }
        Ok(Self { cfg })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut req = HTTP_CLIENT
            .post(&self.cfg.api_url)
            .timeout(Duration::from_secs(self.cfg.timeout_secs))
            .json(&serde_json::json!({
                "model": self.cfg.model,
                "input": texts,
            }));
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| EmbedError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::BadResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbedError::BadResponse(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed
            .data
            .into_iter()
            .map(|row| {
                if row.embedding.len() != self.cfg.dim {
                    Err(EmbedError::DimensionMismatch {
                        expected: self.cfg.dim,
                        got: row.embedding.len(),
                    })
                } else {
                    Ok(row.embedding)
                }
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let batch = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        batch
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::BadResponse("empty embedding batch".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        retry_async(&self.cfg.retry, || self.request(texts)).await
    }

    fn dim(&self) -> usize {
        self.cfg.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_url_and_zero_dim() {
        let bad_url = EmbedConfig {
            api_url: "  ".into(),
            ..EmbedConfig::default()
        };
        assert!(HttpEmbedder::new(bad_url).is_err());

        let bad_dim = EmbedConfig {
            dim: 0,
            ..EmbedConfig::default()
        };
        assert!(HttpEmbedder::new(bad_dim).is_err());
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let embedder = HttpEmbedder::new(EmbedConfig::default()).unwrap();
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }
}
