use thiserror::Error;

/// Errors surfaced by the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("{vectors} vectors but {ids} ids")]
    LengthMismatch { vectors: usize, ids: usize },
    #[error("id {0} is reserved or out of range")]
    InvalidId(i64),
    #[error("training failed: {0}")]
    Training(String),
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Io(e.to_string())
    }
}
