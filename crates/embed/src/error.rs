use thiserror::Error;

/// Errors surfaced by embedding providers.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("invalid embed config: {0}")]
    InvalidConfig(String),
    /// Connection-level failure (DNS, TLS, timeout). Retryable.
    #[error("transport error: {0}")]
    Transport(String),
    /// Non-success HTTP status from the provider.
    #[error("provider returned {status}: {body}")]
    Http { status: u16, body: String },
    /// Response parsed but didn't contain what we asked for.
    #[error("malformed provider response: {0}")]
    BadResponse(String),
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl EmbedError {
    /// Whether retrying the identical request can plausibly succeed.
    /// Rate limiting and server-side errors qualify; bad requests don't.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Transport(_) => true,
            EmbedError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
