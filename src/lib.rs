//! Umbrella crate for the medverify verification stack.
//!
//! `medverify` re-exports the component crates and adds the two workflows
//! that tie them together:
//!
//! - [`IndexBuilder`]: the streaming job that embeds the product catalog
//!   into the vector index.
//! - [`VerificationService`]: query/scan verification: retrieval hits
//!   become weighted evidence, evidence becomes a decision, decisions are
//!   audited.
//!
//! ## Wiring
//!
//! Everything is dependency-injected: the registry, cache, embedder,
//! detector, and OCR engines are ports, so the same wiring serves
//! production adapters and the in-memory test doubles.
//!
//! ```ignore
//! use std::sync::{Arc, RwLock};
//! use medverify::{
//!     AppConfig, IndexBuilder, RetrievalRouter, VerificationService, VectorIndex,
//! };
//!
//! # async fn wire(registry: Arc<dyn medverify::Registry>,
//! #               embedder: Arc<dyn medverify::Embedder>) -> anyhow::Result<()> {
//! let cfg = AppConfig::load()?;
//! let index = Arc::new(RwLock::new(VectorIndex::load(cfg.index.clone())));
//! let router = Arc::new(RetrievalRouter::new(
//!     registry.clone(),
//!     embedder.clone(),
//!     index.clone(),
//!     cfg.router.clone(),
//! ));
//! let service = VerificationService::new(registry, router);
//! let result = service.verify_query("DKL1234567890A1").await?;
//! println!("{:?} ({:.2})", result.decision, result.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! A rebuild produces a fresh [`VectorIndex`] generation; swapping it into
//! the router's `RwLock` is the atomic cut-over readers rely on.

mod builder;
mod config;
mod verify;

pub use builder::{BuildConfig, BuildError, BuildOutcome, BuildReport, IndexBuilder};
pub use config::{AppConfig, ConfigError};
pub use verify::{evidence_from_hit, VerificationService};

// Component crates, re-exported for single-dependency consumers.
pub use catalog::{
    stable_id, AuditEntry, Cache, CatalogError, MemoryCache, MemoryRegistry, ProductRecord,
    ProductStatus, Registry,
};
pub use embed::{EmbedConfig, EmbedError, Embedder, HttpEmbedder, StubEmbedder};
pub use evidence::{
    aggregate, Decision, Evidence, EvidenceSource, MatchStrength, VerificationResult,
};
pub use normalize::{
    clean_code, is_noisy, looks_like_code, normalize_title, parse_query, CodeExtraction,
    CodeExtractor, ExtractorConfig, ParsedQuery, QueryKind,
};
pub use retrieval::{Hit, HitSource, RetrievalRouter, RouterConfig, SearchError};
pub use scan::{
    DetBox, DetectSnapshot, Detector, DetectorConfig, FrameMsg, MatchSummary, Ocr, OcrLine,
    RtWorker, ScanConfig, ScanError, ScanOptions, ScanPipeline, ScanResult, ScanStage,
    ScanTimings, TitleRead,
};
pub use vecindex::{IndexError, IndexMode, VecIndexConfig, VectorIndex};
