use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;

use catalog::{MemoryRegistry, ProductRecord};
use embed::StubEmbedder;
use normalize::CodeExtractor;
use retrieval::{RetrievalRouter, RouterConfig};
use vecindex::{VecIndexConfig, VectorIndex};

use super::*;
use crate::ports::{Detector, Ocr, OcrLine, TitleRead};

const DIM: usize = 32;

fn title_box(confidence: f32) -> DetBox {
    DetBox {
        x1: 4,
        y1: 4,
        x2: 40,
        y2: 16,
        confidence,
        class_id: 1,
        class_name: "title".into(),
    }
}

fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(64, 48, image::Rgb([200, 200, 200]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

struct FakeDetector {
    boxes: Vec<DetBox>,
}

#[async_trait]
impl Detector for FakeDetector {
    async fn detect(&self, _image: &RgbImage) -> Result<Vec<DetBox>, ScanError> {
        Ok(self.boxes.clone())
    }
}

/// OCR fake with per-operation artificial latency and a call counter for
/// the full-image pass.
struct FakeOcr {
    title: Option<(String, f32)>,
    title_delay_ms: u64,
    lines: Vec<String>,
    lines_delay_ms: u64,
    full_calls: Arc<AtomicU64>,
}

#[async_trait]
impl Ocr for FakeOcr {
    async fn ocr_title(&self, _crop: &RgbImage) -> Result<TitleRead, ScanError> {
        tokio::time::sleep(Duration::from_millis(self.title_delay_ms)).await;
        Ok(TitleRead {
            text: self.title.as_ref().map(|(t, _)| t.clone()),
            confidence: self.title.as_ref().map(|(_, c)| *c),
            elapsed_ms: self.title_delay_ms,
        })
    }

    async fn ocr_lines(&self, _image: &RgbImage) -> Result<(Vec<OcrLine>, u64), ScanError> {
        self.full_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.lines_delay_ms)).await;
        let lines = self
            .lines
            .iter()
            .map(|t| OcrLine {
                text: t.clone(),
                confidence: 0.9,
                bbox: Vec::new(),
            })
            .collect();
        Ok((lines, self.lines_delay_ms))
    }
}

fn catalog_router() -> Arc<RetrievalRouter> {
    let registry = Arc::new(MemoryRegistry::new());
    let mut rec = ProductRecord::new("1");
    rec.code = Some("DKL1234567890".into());
    rec.name = Some("Paracetamol 500".into());
    rec.status = Some("valid".into());
    registry.insert(rec);

    Arc::new(RetrievalRouter::new(
        registry,
        Arc::new(StubEmbedder::new(DIM)),
        Arc::new(RwLock::new(VectorIndex::empty(
            VecIndexConfig::default().with_dim(DIM),
        ))),
        RouterConfig::default(),
    ))
}

fn pipeline(boxes: Vec<DetBox>, ocr: FakeOcr, cfg: ScanConfig) -> ScanPipeline {
    ScanPipeline::new(
        Arc::new(FakeDetector { boxes }),
        DetectorConfig::default(),
        Arc::new(ocr),
        catalog_router(),
        CodeExtractor::default(),
        cfg,
    )
}

fn fast_title_ocr(full_calls: Arc<AtomicU64>) -> FakeOcr {
    FakeOcr {
        title: Some(("Paracetamol 500 mg Tablet".into(), 0.88)),
        title_delay_ms: 10,
        lines: vec!["PT PHARMA".into(), "No. Reg: DKL1234567890".into()],
        lines_delay_ms: 10,
        full_calls,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn t1_wins_and_partial_returns_early() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = FakeOcr {
        lines_delay_ms: 2_000, // T2 must lose
        ..fast_title_ocr(calls.clone())
    };
    let pipe = pipeline(vec![title_box(0.9)], ocr, ScanConfig::default());

    let result = pipe
        .run(
            png_bytes(),
            ScanOptions {
                return_partial: true,
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.stage, ScanStage::Partial);
    assert_eq!(result.title_text.as_deref(), Some("PARACETAMOL 500"));
    assert_eq!(result.title_conf, Some(0.88));
    let m = result.match_.expect("catalog match");
    assert_eq!(m.product.code.as_deref(), Some("DKL1234567890"));
    assert!(result.code.is_none());
    assert!(!result.needs_more_input);
    assert!(result.timings.total_ms < 2_000);
}

#[tokio::test(flavor = "multi_thread")]
async fn t2_wins_when_title_ocr_stalls() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = FakeOcr {
        title_delay_ms: 2_000, // T1 stalls
        ..fast_title_ocr(calls.clone())
    };
    let pipe = pipeline(vec![title_box(0.9)], ocr, ScanConfig::default());

    let result = pipe
        .run(
            png_bytes(),
            ScanOptions {
                return_partial: true,
                t1_timeout_ms: Some(300),
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.stage, ScanStage::Final);
    assert_eq!(result.code.as_deref(), Some("DKL1234567890"));
    assert!(result.title_text.is_none());
    assert!(result.match_.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn neither_done_synthesizes_partial() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = FakeOcr {
        title_delay_ms: 1_000,
        lines_delay_ms: 1_000,
        ..fast_title_ocr(calls.clone())
    };
    let pipe = pipeline(vec![title_box(0.9)], ocr, ScanConfig::default());

    let result = pipe
        .run(
            png_bytes(),
            ScanOptions {
                return_partial: true,
                t1_timeout_ms: Some(50),
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.stage, ScanStage::Partial);
    assert!(result.title_text.is_none());
    assert!(result.code.is_none());
    assert!(result.match_.is_none());
    assert_eq!(result.boxes.len(), 1);
    assert!(result.title_box.is_some());
    assert!(result.needs_more_input);
    assert!(!result.suggestions.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn waiting_mode_merges_both_tasks() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = fast_title_ocr(calls.clone());
    let pipe = pipeline(vec![title_box(0.9)], ocr, ScanConfig::default());

    let result = pipe
        .run(png_bytes(), ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(result.stage, ScanStage::Final);
    // Fields from both tasks, none erased by the other's nulls.
    assert_eq!(result.title_text.as_deref(), Some("PARACETAMOL 500"));
    assert_eq!(result.code.as_deref(), Some("DKL1234567890"));
    assert!(result.match_.is_some());
    assert!(!result.regex_skipped);

    let t = &result.timings;
    assert!(t.total_ms >= t.ocr_title_ms.max(t.ocr_full_ms));
    assert_eq!(t.ocr_title_ms, 10);
    assert_eq!(t.ocr_full_ms, 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn regex_gate_skips_full_ocr() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = fast_title_ocr(calls.clone());
    // 0.5 < 0.70 gate
    let pipe = pipeline(vec![title_box(0.5)], ocr, ScanConfig::default());

    let result = pipe
        .run(png_bytes(), ScanOptions::default())
        .await
        .unwrap();

    assert!(result.regex_skipped);
    assert!(result.code.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // T1 still ran normally.
    assert_eq!(result.title_text.as_deref(), Some("PARACETAMOL 500"));
}

#[tokio::test(flavor = "multi_thread")]
async fn regex_gate_boundary_runs_t2() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = fast_title_ocr(calls.clone());
    // exactly at the gate → runs
    let pipe = pipeline(vec![title_box(0.70)], ocr, ScanConfig::default());

    let result = pipe
        .run(png_bytes(), ScanOptions::default())
        .await
        .unwrap();

    assert!(!result.regex_skipped);
    assert_eq!(result.code.as_deref(), Some("DKL1234567890"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn always_run_regex_overrides_gate() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = fast_title_ocr(calls.clone());
    let cfg = ScanConfig {
        always_run_regex: true,
        ..ScanConfig::default()
    };
    // No boxes at all → yolo_title_conf = 0, gate unmet, override applies.
    let pipe = pipeline(Vec::new(), ocr, cfg);

    let result = pipe
        .run(png_bytes(), ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(result.code.as_deref(), Some("DKL1234567890"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn no_title_box_ocrs_full_frame() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = fast_title_ocr(calls.clone());
    let pipe = pipeline(Vec::new(), ocr, ScanConfig::default());

    let result = pipe
        .run(
            png_bytes(),
            ScanOptions {
                return_partial: true,
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();

    assert!(result.title_box.is_none());
    assert_eq!(result.title_text.as_deref(), Some("PARACETAMOL 500"));
    assert!(result.match_.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_ocr_yields_need_more_input() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = FakeOcr {
        title: None,
        title_delay_ms: 5,
        lines: Vec::new(),
        lines_delay_ms: 5,
        full_calls: calls,
    };
    let pipe = pipeline(vec![title_box(0.9)], ocr, ScanConfig::default());

    let result = pipe
        .run(png_bytes(), ScanOptions::default())
        .await
        .unwrap();

    assert!(result.needs_more_input);
    assert_eq!(result.suggestions.len(), 2);
    assert_eq!(result.stage, ScanStage::Final);
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_image_is_the_only_error() {
    let calls = Arc::new(AtomicU64::new(0));
    let ocr = fast_title_ocr(calls);
    let pipe = pipeline(vec![title_box(0.9)], ocr, ScanConfig::default());

    let err = pipe
        .run(b"not an image".to_vec(), ScanOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::InvalidImage(_)));
}
