use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Runtime configuration for the HTTP embedder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedConfig {
    /// Embeddings endpoint (OpenAI-compatible JSON protocol).
    #[serde(default = "EmbedConfig::default_api_url")]
    pub api_url: String,
    /// Bearer token; absent means the endpoint is unauthenticated.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "EmbedConfig::default_model")]
    pub model: String,
    /// Expected output dimension; responses with a different width are rejected.
    #[serde(default = "EmbedConfig::default_dim")]
    pub dim: usize,
    #[serde(default = "EmbedConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl EmbedConfig {
    fn default_api_url() -> String {
        "https://api.openai.com/v1/embeddings".to_string()
    }

    fn default_model() -> String {
        "text-embedding-3-small".to_string()
    }

    fn default_dim() -> usize {
        1536
    }

    fn default_timeout_secs() -> u64 {
        30
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            api_url: Self::default_api_url(),
            api_key: None,
            model: Self::default_model(),
            dim: Self::default_dim(),
            timeout_secs: Self::default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}
