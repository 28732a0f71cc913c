//! Deployment configuration for the whole verification stack.
//!
//! Every component crate owns its `*Config` struct with serde defaults;
//! this module bundles them and loads the bundle from, in order of
//! precedence:
//!
//! 1. environment variables with the `MEDVERIFY` prefix and `__` as the
//!    section separator (`MEDVERIFY_SCAN__T1_TIMEOUT_MS=350`),
//! 2. an optional `medverify.yaml` next to the process,
//! 3. the compiled-in defaults.
//!
//! Configuration problems surface here, at startup, never per-request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use catalog::CatalogError;
use embed::EmbedConfig;
use normalize::{CodeExtractor, ExtractorConfig, NormalizeError};
use retrieval::RouterConfig;
use scan::{DetectorConfig, ScanConfig};
use vecindex::VecIndexConfig;

use crate::builder::BuildConfig;

/// Errors raised while assembling the configuration bundle.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid extractor config: {0}")]
    Extractor(#[from] NormalizeError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// The full environment-driven bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub embed: EmbedConfig,
    #[serde(default)]
    pub index: VecIndexConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    /// OCR engine selector for the wiring layer (`tesseract` | `paddle`).
    #[serde(default = "AppConfig::default_ocr_engine")]
    pub ocr_engine: String,
    /// Optional YAML file with extractor patterns; defaults compiled in.
    #[serde(default)]
    pub regex_config_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            embed: EmbedConfig::default(),
            index: VecIndexConfig::default(),
            build: BuildConfig::default(),
            router: RouterConfig::default(),
            scan: ScanConfig::default(),
            detector: DetectorConfig::default(),
            ocr_engine: Self::default_ocr_engine(),
            regex_config_path: None,
        }
    }
}

impl AppConfig {
    fn default_ocr_engine() -> String {
        "tesseract".to_string()
    }

    /// Load from environment (and `medverify.yaml` when present).
    pub fn load() -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("medverify").required(false))
            .add_source(config::Environment::with_prefix("MEDVERIFY").separator("__"));
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Build the code extractor from the configured pattern file (or the
    /// compiled-in defaults).
    pub fn code_extractor(&self) -> Result<CodeExtractor, ConfigError> {
        let cfg = match &self.regex_config_path {
            Some(path) => ExtractorConfig::from_yaml_file(path),
            None => ExtractorConfig::default(),
        };
        Ok(CodeExtractor::new(cfg)?)
    }
}
