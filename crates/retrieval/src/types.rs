use catalog::{CatalogError, ProductRecord};
use embed::EmbedError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vecindex::IndexError;

/// Which tier produced (or co-produced) a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Exact,
    Lex,
    Vector,
    Hybrid,
}

impl std::fmt::Display for HitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HitSource::Exact => "exact",
            HitSource::Lex => "lex",
            HitSource::Vector => "vector",
            HitSource::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// One enriched retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub record: ProductRecord,
    /// Blended relevance in [0, 1].
    pub score: f32,
    pub source: HitSource,
}

impl Hit {
    /// Blend key: registration code when present, primary id otherwise.
    pub(crate) fn key(record: &ProductRecord) -> String {
        record
            .code
            .clone()
            .unwrap_or_else(|| record.id.clone())
    }
}

/// Router tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    /// Candidates requested from the lexical tier.
    #[serde(default = "RouterConfig::default_lex_limit")]
    pub lex_limit: usize,
    /// Neighbors requested from the vector tier.
    #[serde(default = "RouterConfig::default_vector_k")]
    pub vector_k: usize,
    /// Below this best lexical score the vector tier kicks in.
    #[serde(default = "RouterConfig::default_lex_score_floor")]
    pub lex_score_floor: f32,
    /// Score assigned to an exact-tier hit.
    #[serde(default = "RouterConfig::default_exact_score")]
    pub exact_score: f32,
    /// Provider-side lexical index name, when the backend has several.
    #[serde(default)]
    pub lex_index: Option<String>,
    /// Hard-disable the vector tier (no embedding provider configured).
    #[serde(default)]
    pub disable_vector: bool,
}

impl RouterConfig {
    fn default_lex_limit() -> usize {
        25
    }

    fn default_vector_k() -> usize {
        25
    }

    fn default_lex_score_floor() -> f32 {
        0.35
    }

    fn default_exact_score() -> f32 {
        0.99
    }

    pub fn with_disable_vector(mut self, disable: bool) -> Self {
        self.disable_vector = disable;
        self
    }

    pub fn with_lex_index(mut self, index: impl Into<String>) -> Self {
        self.lex_index = Some(index.into());
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            lex_limit: Self::default_lex_limit(),
            vector_k: Self::default_vector_k(),
            lex_score_floor: Self::default_lex_score_floor(),
            exact_score: Self::default_exact_score(),
            lex_index: None,
            disable_vector: false,
        }
    }
}

/// Search failures. Registry problems abort the search; embedding and index
/// problems are caught inside the router and degrade to lexical-only
/// results.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("registry error: {0}")]
    Registry(#[from] CatalogError),
    #[error("embed error: {0}")]
    Embed(#[from] EmbedError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}
