use thiserror::Error;

/// Errors surfaced by the scan layer.
///
/// Inside the pipeline, task failures are caught and contribute nulls; only
/// conditions that make the whole request meaningless reach the caller.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The submitted bytes are not a decodable image.
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("detector error: {0}")]
    Detector(String),
    #[error("ocr error: {0}")]
    Ocr(String),
    #[error("internal error: {0}")]
    Internal(String),
}
