use std::path::PathBuf;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// One detection box in pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub confidence: f32,
    pub class_id: u32,
    pub class_name: String,
}

/// One OCR'd text line from a full-image pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub text: String,
    pub confidence: f32,
    /// Polygon corners, when the engine reports them.
    #[serde(default)]
    pub bbox: Vec<(u32, u32)>,
}

/// Best single line from a cropped region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRead {
    pub text: Option<String>,
    pub confidence: Option<f32>,
    pub elapsed_ms: u64,
}

/// Object-detection port. Engines are constructed once at startup (model
/// load is expensive) and shared as `Arc<dyn Detector>`; implementations
/// must be safe for concurrent calls.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<DetBox>, ScanError>;
}

/// OCR port: one call shape per pipeline task.
#[async_trait]
pub trait Ocr: Send + Sync {
    /// Best single line from a (usually cropped) region.
    async fn ocr_title(&self, crop: &RgbImage) -> Result<TitleRead, ScanError>;
    /// Every line on the image, plus the engine's elapsed milliseconds.
    async fn ocr_lines(&self, image: &RgbImage) -> Result<(Vec<OcrLine>, u64), ScanError>;
}

/// Detector deployment knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    /// Class id treated as the product title region.
    #[serde(default = "DetectorConfig::default_title_class_id")]
    pub title_class_id: u32,
    /// Class-name fallback when a model ships different ids.
    #[serde(default = "DetectorConfig::default_title_class_name")]
    pub title_class_name: String,
    /// Inference-time square image size.
    #[serde(default = "DetectorConfig::default_image_size")]
    pub image_size: u32,
    #[serde(default = "DetectorConfig::default_weights_path")]
    pub weights_path: PathBuf,
}

impl DetectorConfig {
    fn default_title_class_id() -> u32 {
        1
    }

    fn default_title_class_name() -> String {
        "title".to_string()
    }

    fn default_image_size() -> u32 {
        640
    }

    fn default_weights_path() -> PathBuf {
        PathBuf::from("models/detector/weights.onnx")
    }

    /// Whether `b` is a title candidate under this config.
    pub fn is_title(&self, b: &DetBox) -> bool {
        b.class_id == self.title_class_id || b.class_name == self.title_class_name
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            title_class_id: Self::default_title_class_id(),
            title_class_name: Self::default_title_class_name(),
            image_size: Self::default_image_size(),
            weights_path: Self::default_weights_path(),
        }
    }
}
