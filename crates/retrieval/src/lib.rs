//! Blended retrieval over the product catalog.
//!
//! A query flows through up to three tiers:
//!
//! 1. **Exact**: when the query looks like a registration code, a direct
//!    registry lookup. A hit short-circuits everything else.
//! 2. **Lexical**: always consulted; the registry's own relevance scores
//!    ride along on the records.
//! 3. **Vector**: only when the query is noisy or lexical confidence is
//!    low (or never, when disabled for deployments without an embedding
//!    provider). Raw index distances are mapped to similarities here via
//!    `1 / (1 + d)`; the index stays agnostic about what its distances
//!    mean.
//!
//! Records found by both the lexical and vector tiers are fused
//! (`0.6·lex + 0.4·vec`) and tagged [`HitSource::Hybrid`].

mod router;
mod types;

pub use router::RetrievalRouter;
pub use types::{Hit, HitSource, RouterConfig, SearchError};
