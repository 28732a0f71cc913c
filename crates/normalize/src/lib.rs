//! Text normalization and classification for registry queries.
//!
//! Everything here is deterministic string work, shared by the retrieval
//! router (query classification), the scan pipeline (OCR cleanup, code
//! extraction), and the verification use case (query parsing):
//!
//! - [`normalize_title`] / [`clean_code`]: canonical forms for fuzzy and
//!   exact comparison.
//! - [`looks_like_code`] / [`is_noisy`]: the predicates that steer tier
//!   selection in the router.
//! - [`parse_query`]: light structure extraction from free-form user text.
//! - [`CodeExtractor`]: configurable regex extraction of registration
//!   numbers from OCR output.

mod classify;
mod extractor;
mod title;

pub use classify::{is_noisy, looks_like_code, parse_query, ParsedQuery, QueryKind};
pub use extractor::{CodeExtraction, CodeExtractor, ExtractorConfig, NormalizeError};
pub use title::{clean_code, normalize_title};
