//! Bounded-latency extraction of product identity from label photographs.
//!
//! The pipeline runs two extraction strategies concurrently and merges
//! whatever finishes inside the budget:
//!
//! - **T1** (fast path): object detection picks the title region, OCR reads
//!   it, and the retrieval router is asked for the best catalog match.
//! - **T2** (thorough path): full-image OCR feeds the regex code extractor
//!   to pull out a registration number. Gated on detection confidence so a
//!   blurry frame doesn't pay for a full OCR pass that regex can't use.
//!
//! Two deadlines shape the race: `t1_timeout` bounds the wait for the first
//! result, `t2_timeout` the whole call. Callers that prefer latency get the
//! first result (`return_partial`); callers that prefer completeness wait
//! out the second deadline. Either way [`ScanPipeline::run`] returns a
//! result; task failures contribute nulls, never errors. The only
//! client-facing error is an undecodable image.
//!
//! [`RtWorker`] adapts the same detector to a streaming feed with a
//! single-slot queue that keeps the freshest frame and drops the rest.

mod error;
mod image_ops;
mod pipeline;
mod ports;
mod rt;

pub use error::ScanError;
pub use image_ops::{crop_with_pad, decode_and_resize, MAX_SIDE};
pub use pipeline::{
    MatchSummary, ScanConfig, ScanOptions, ScanPipeline, ScanResult, ScanStage, ScanTimings,
};
pub use ports::{DetBox, Detector, DetectorConfig, Ocr, OcrLine, TitleRead};
pub use rt::{DetectSnapshot, FrameMsg, RtWorker};
