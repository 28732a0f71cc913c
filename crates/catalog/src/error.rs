use thiserror::Error;

/// Errors surfaced by catalog ports.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backing store rejected or failed the operation.
    #[error("registry error: {0}")]
    Registry(String),
    /// Cache backend failure. Callers generally treat this as a miss.
    #[error("cache error: {0}")]
    Cache(String),
    /// A record failed to round-trip through serialization.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn registry<E: std::fmt::Display>(err: E) -> Self {
        Self::Registry(err.to_string())
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
