#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use catalog::ProductRecord;
use normalize::{normalize_title, CodeExtractor};
use retrieval::{HitSource, RetrievalRouter};

use crate::error::ScanError;
use crate::image_ops::{crop_with_pad, decode_and_resize};
use crate::ports::{DetBox, Detector, DetectorConfig, Ocr};

/// Padding around the detected title box before cropping, in pixels.
const TITLE_CROP_PAD: u32 = 6;

/// Scan latency and gating knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Budget for the first usable result.
    #[serde(default = "ScanConfig::default_t1_timeout_ms")]
    pub t1_timeout_ms: u64,
    /// Budget for the whole scan.
    #[serde(default = "ScanConfig::default_t2_timeout_ms")]
    pub t2_timeout_ms: u64,
    /// Minimum title-detection confidence before the full-OCR/regex task
    /// is worth its cost.
    #[serde(default = "ScanConfig::default_regex_gate")]
    pub regex_gate: f32,
    /// Run the regex task even below the gate.
    #[serde(default)]
    pub always_run_regex: bool,
}

impl ScanConfig {
    fn default_t1_timeout_ms() -> u64 {
        500
    }

    fn default_t2_timeout_ms() -> u64 {
        1200
    }

    fn default_regex_gate() -> f32 {
        0.70
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            t1_timeout_ms: Self::default_t1_timeout_ms(),
            t2_timeout_ms: Self::default_t2_timeout_ms(),
            regex_gate: Self::default_regex_gate(),
            always_run_regex: false,
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Return the first finished task's result instead of waiting out the
    /// full budget. Defaults to false; the HTTP layer usually sets it.
    pub return_partial: bool,
    pub t1_timeout_ms: Option<u64>,
    pub t2_timeout_ms: Option<u64>,
}

/// How much of the race had finished when the result was assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStage {
    Partial,
    Final,
}

/// Milliseconds per phase. A phase that didn't run reports zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTimings {
    pub yolo_ms: u64,
    pub ocr_title_ms: u64,
    pub search_ms: u64,
    pub ocr_full_ms: u64,
    pub regex_ms: u64,
    pub total_ms: u64,
}

/// Top retrieval hit attached to a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    pub product: ProductRecord,
    pub source: HitSource,
    pub confidence: f32,
}

/// The pipeline's answer. Always produced, however little was extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub request_id: String,
    pub stage: ScanStage,
    pub title_text: Option<String>,
    pub title_conf: Option<f32>,
    /// Registration number pulled out by the regex task.
    pub code: Option<String>,
    /// Extractor confidence for `code`.
    pub code_conf: Option<f32>,
    /// True when the T2 gate decided full OCR wasn't worth running.
    pub regex_skipped: bool,
    #[serde(rename = "match")]
    pub match_: Option<MatchSummary>,
    pub boxes: Vec<DetBox>,
    pub title_box: Option<DetBox>,
    /// Neither a code nor any title text was extracted; `suggestions`
    /// tells the client how to take a better photo.
    pub needs_more_input: bool,
    pub suggestions: Vec<String>,
    pub timings: ScanTimings,
}

#[derive(Debug, Default)]
struct T1Out {
    title_text: Option<String>,
    title_conf: Option<f32>,
    match_: Option<MatchSummary>,
    ocr_title_ms: u64,
    search_ms: u64,
}

#[derive(Debug, Default)]
struct T2Out {
    code: Option<String>,
    code_conf: Option<f32>,
    regex_skipped: bool,
    ocr_full_ms: u64,
    regex_ms: u64,
}

enum FirstDone {
    T1(Option<T1Out>),
    T2(Option<T2Out>),
    Neither,
}

/// Orchestrates detection → (T1 ∥ T2) → merge under the configured budget.
pub struct ScanPipeline {
    detector: Arc<dyn Detector>,
    detector_cfg: DetectorConfig,
    ocr: Arc<dyn Ocr>,
    router: Arc<RetrievalRouter>,
    extractor: Arc<CodeExtractor>,
    cfg: ScanConfig,
}

impl ScanPipeline {
    pub fn new(
        detector: Arc<dyn Detector>,
        detector_cfg: DetectorConfig,
        ocr: Arc<dyn Ocr>,
        router: Arc<RetrievalRouter>,
        extractor: CodeExtractor,
        cfg: ScanConfig,
    ) -> Self {
        Self {
            detector,
            detector_cfg,
            ocr,
            router,
            extractor: Arc::new(extractor),
            cfg,
        }
    }

    /// Scan one photo. The only error is an undecodable image; everything
    /// downstream degrades to null fields in the result.
    pub async fn run(&self, data: Vec<u8>, opts: ScanOptions) -> Result<ScanResult, ScanError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let t1_budget = Duration::from_millis(opts.t1_timeout_ms.unwrap_or(self.cfg.t1_timeout_ms));
        let t2_budget = Duration::from_millis(opts.t2_timeout_ms.unwrap_or(self.cfg.t2_timeout_ms));

        let img = tokio::task::spawn_blocking(move || decode_and_resize(&data))
            .await
            .map_err(|e| ScanError::Internal(e.to_string()))??;
        let img = Arc::new(img);

        // Detection runs once, up front; both tasks consume its output.
        let y0 = Instant::now();
        let boxes = match self.detector.detect(&img).await {
            Ok(boxes) => boxes,
            Err(e) => {
                warn!(%request_id, error = %e, "detector failed, continuing without boxes");
                Vec::new()
            }
        };
        let yolo_ms = y0.elapsed().as_millis() as u64;

        let title_box = boxes
            .iter()
            .filter(|b| self.detector_cfg.is_title(b))
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();
        let yolo_title_conf = title_box.as_ref().map(|b| b.confidence).unwrap_or(0.0);

        // No title box → OCR the full frame instead.
        let title_crop = match &title_box {
            Some(b) => crop_with_pad(&img, b, TITLE_CROP_PAD),
            None => (*img).clone(),
        };

        let mut t1 = self.spawn_t1(title_crop);
        let mut t2 = self.spawn_t2(Arc::clone(&img), yolo_title_conf);

        let mut result = ScanResult {
            request_id: request_id.clone(),
            stage: ScanStage::Partial,
            title_text: None,
            title_conf: None,
            code: None,
            code_conf: None,
            regex_skipped: false,
            match_: None,
            boxes,
            title_box,
            needs_more_input: false,
            suggestions: Vec::new(),
            timings: ScanTimings {
                yolo_ms,
                ..ScanTimings::default()
            },
        };

        let first = tokio::select! {
            r = &mut t1 => FirstDone::T1(r.ok()),
            r = &mut t2 => FirstDone::T2(r.ok()),
            _ = tokio::time::sleep(t1_budget) => FirstDone::Neither,
        };

        let (mut t1_done, mut t2_done) = (false, false);
        match first {
            FirstDone::T1(out) => {
                t1_done = true;
                apply_t1(&mut result, out);
                // The other task may have finished in the same instant.
                if t2.is_finished() {
                    t2_done = true;
                    apply_t2(&mut result, (&mut t2).await.ok());
                }
            }
            FirstDone::T2(out) => {
                t2_done = true;
                apply_t2(&mut result, out);
                if t1.is_finished() {
                    t1_done = true;
                    apply_t1(&mut result, (&mut t1).await.ok());
                }
            }
            FirstDone::Neither => {
                debug!(%request_id, "neither task finished within t1 budget");
            }
        }

        if opts.return_partial {
            // Fire-and-forget the loser; its work is memory-only.
            if !t1_done {
                t1.abort();
            }
            if !t2_done {
                t2.abort();
            }
        } else {
            let deadline = tokio::time::Instant::now() + t2_budget.saturating_sub(t1_budget);
            if !t2_done {
                match tokio::time::timeout_at(deadline, &mut t2).await {
                    Ok(r) => apply_t2(&mut result, r.ok()),
                    Err(_) => t2.abort(),
                }
            }
            if !t1_done {
                match tokio::time::timeout_at(deadline, &mut t1).await {
                    Ok(r) => apply_t1(&mut result, r.ok()),
                    Err(_) => t1.abort(),
                }
            }
            // The race is over either way; nothing further will arrive.
            result.stage = ScanStage::Final;
        }

        if result.code.is_none() && result.title_text.is_none() {
            result.needs_more_input = true;
            result.suggestions = vec![
                "Retake the photo with better lighting.".to_string(),
                "Move closer so the label fills the frame.".to_string(),
            ];
        }

        result.timings.total_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn spawn_t1(&self, crop: RgbImage) -> JoinHandle<T1Out> {
        let ocr = Arc::clone(&self.ocr);
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            let mut out = T1Out::default();
            let read = match ocr.ocr_title(&crop).await {
                Ok(read) => read,
                Err(e) => {
                    warn!(error = %e, "title ocr failed");
                    return out;
                }
            };
            out.ocr_title_ms = read.elapsed_ms;

            let Some(raw) = read.text else { return out };
            let clean = normalize_title(&raw);
            if clean.is_empty() {
                return out;
            }
            out.title_text = Some(clean.clone());
            out.title_conf = read.confidence;

            let s0 = Instant::now();
            match router.search(&clean, 1).await {
                Ok(hits) => {
                    out.search_ms = s0.elapsed().as_millis() as u64;
                    out.match_ = hits.into_iter().next().map(|h| MatchSummary {
                        source: h.source,
                        confidence: h.score,
                        product: h.record,
                    });
                }
                Err(e) => {
                    out.search_ms = s0.elapsed().as_millis() as u64;
                    warn!(error = %e, "title search failed");
                }
            }
            out
        })
    }

    fn spawn_t2(&self, img: Arc<RgbImage>, yolo_title_conf: f32) -> JoinHandle<T2Out> {
        let gate_met = yolo_title_conf >= self.cfg.regex_gate || self.cfg.always_run_regex;
        let ocr = Arc::clone(&self.ocr);
        let extractor = Arc::clone(&self.extractor);
        tokio::spawn(async move {
            if !gate_met {
                // Full OCR on a frame the detector barely trusts is wasted
                // budget; report the skip instead.
                return T2Out {
                    regex_skipped: true,
                    ..T2Out::default()
                };
            }
            let mut out = T2Out::default();
            let (lines, ocr_ms) = match ocr.ocr_lines(&img).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "full ocr failed");
                    return out;
                }
            };
            out.ocr_full_ms = ocr_ms;

            let full_text = lines
                .iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let r0 = Instant::now();
            let extraction = extractor.extract(&full_text);
            out.regex_ms = r0.elapsed().as_millis() as u64;
            if extraction.code.is_some() {
                out.code_conf = Some(extraction.confidence);
            }
            out.code = extraction.code;
            out
        })
    }
}

/// Fill T1 fields that are still null. A null from the producing task never
/// erases an earlier non-null value.
fn apply_t1(result: &mut ScanResult, out: Option<T1Out>) {
    let Some(out) = out else { return };
    if result.title_text.is_none() {
        result.title_text = out.title_text;
    }
    if result.title_conf.is_none() {
        result.title_conf = out.title_conf;
    }
    if result.match_.is_none() {
        result.match_ = out.match_;
    }
    result.timings.ocr_title_ms = out.ocr_title_ms;
    result.timings.search_ms = out.search_ms;
}

/// Merge the final-tagged task: fills the code fields and promotes the
/// stage.
fn apply_t2(result: &mut ScanResult, out: Option<T2Out>) {
    let Some(out) = out else { return };
    if result.code.is_none() {
        result.code = out.code;
        result.code_conf = out.code_conf;
    }
    result.regex_skipped = out.regex_skipped;
    result.timings.ocr_full_ms = out.ocr_full_ms;
    result.timings.regex_ms = out.regex_ms;
    result.stage = ScanStage::Final;
}
