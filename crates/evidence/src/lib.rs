//! Multi-source confidence engine.
//!
//! Retrieval tiers and external providers each contribute an [`Evidence`]
//! about a candidate product; [`aggregate`] fuses them into a single
//! [`VerificationResult`] with an auditable trace. Scoring is a weighted
//! blend of match strength, data quality, recency, and the confidence of
//! the extracted query (OCR/regex), with per-source trust weights on top.
//!
//! The decision ladder is deliberately conservative: only a strong match
//! from the official registry can say `valid`/`invalid` on its own;
//! agreement between weaker sources can only push toward `invalid`
//! ("several places say unregistered"), never `valid`.

mod aggregate;
mod types;

pub use aggregate::{aggregate, recency_factor, record_quality, score_evidence};
pub use types::{
    Decision, Evidence, EvidenceSource, MatchStrength, VerificationResult,
};
