use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid extractor pattern `{pattern}`: {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Patterns and filters for registration-number extraction.
///
/// Loadable from YAML so deployments can track registry format changes
/// without a rebuild; compiled-in defaults cover the known code families.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractorConfig {
    /// A matched number must start with one of these or it is discarded.
    #[serde(default = "ExtractorConfig::default_allow_prefix")]
    pub allow_prefix: Vec<String>,
    /// Tried in order; first surviving match wins.
    #[serde(default = "ExtractorConfig::default_patterns")]
    pub patterns: Vec<String>,
    /// Any hit anywhere in the text preempts extraction entirely.
    #[serde(default = "ExtractorConfig::default_blacklist")]
    pub blacklist: Vec<String>,
}

impl ExtractorConfig {
    fn default_allow_prefix() -> Vec<String> {
        ["DKL", "DBL", "DKI", "ML", "MD"]
            .map(String::from)
            .to_vec()
    }

    fn default_patterns() -> Vec<String> {
        [
            r"(?:DKL|DBL|DKI)\d{8,14}",
            r"(?:ML|MD)\d{12,15}",
            r"BPOM(?:RI)?(?:ML|MD)\d{12,15}",
            r"P-?IRT\d{12,17}",
        ]
        .map(String::from)
        .to_vec()
    }

    fn default_blacklist() -> Vec<String> {
        [r"(?i)SAMPLE", r"(?i)DEMO"].map(String::from).to_vec()
    }

    /// Load from a YAML file. A missing or unparseable file logs a warning
    /// and yields the defaults; extractor config must never block startup.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_yaml::from_str(&text) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid extractor config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "extractor config unreadable, using defaults");
                Self::default()
            }
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            allow_prefix: Self::default_allow_prefix(),
            patterns: Self::default_patterns(),
            blacklist: Self::default_blacklist(),
        }
    }
}

/// Outcome of a single extraction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeExtraction {
    pub code: Option<String>,
    pub confidence: f32,
    /// Which pattern matched, e.g. `pat_1`.
    pub pattern_id: Option<String>,
    pub note: Option<String>,
}

impl CodeExtraction {
    fn none() -> Self {
        Self {
            code: None,
            confidence: 0.0,
            pattern_id: None,
            note: None,
        }
    }
}

/// Regex-based registration-number extractor over OCR output.
pub struct CodeExtractor {
    allow_prefix: Vec<String>,
    patterns: Vec<Regex>,
    blacklist: Vec<Regex>,
}

impl CodeExtractor {
    pub fn new(cfg: ExtractorConfig) -> Result<Self, NormalizeError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, NormalizeError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|source| NormalizeError::BadPattern {
                        pattern: p.clone(),
                        source,
                    })
                })
                .collect()
        };
        Ok(Self {
            allow_prefix: cfg.allow_prefix.clone(),
            patterns: compile(&cfg.patterns)?,
            blacklist: compile(&cfg.blacklist)?,
        })
    }

    /// Extract a registration number from arbitrary text.
    ///
    /// The text is uppercased and de-spaced first (OCR loves to split
    /// numbers). Confidence grows with match length: `0.6 + 0.02·len`,
    /// capped at 0.99.
    pub fn extract(&self, text: &str) -> CodeExtraction {
        let s: String = text.to_uppercase().replace(' ', "");

        for bl in &self.blacklist {
            if bl.is_match(&s) {
                return CodeExtraction {
                    note: Some("blacklisted".to_string()),
                    ..CodeExtraction::none()
                };
            }
        }

        for (i, pat) in self.patterns.iter().enumerate() {
            let Some(m) = pat.find(&s) else { continue };
            let number = m.as_str();
            if !self.allow_prefix.is_empty()
                && !self.allow_prefix.iter().any(|p| number.starts_with(p))
            {
                continue;
            }
            let confidence = (0.6 + 0.02 * number.len() as f32).min(0.99);
            return CodeExtraction {
                code: Some(number.to_string()),
                confidence,
                pattern_id: Some(format!("pat_{i}")),
                note: None,
            };
        }

        CodeExtraction::none()
    }
}

impl Default for CodeExtractor {
    fn default() -> Self {
        // Compiled-in defaults are static and known-valid.
        Self::new(ExtractorConfig::default()).unwrap()
    }
}
