use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Sentinel returned by the vector index for "no neighbor in this slot".
/// [`stable_id`] is masked so it can never collide with this value.
pub const VECTOR_ID_SENTINEL: i64 = -1;

/// A single product entry in the official catalog.
///
/// Records are written by external crawlers; the core reads them and, on
/// first embedding, patches in [`faiss_id`](Self::faiss_id). Provider
/// fields that the core does not model (lexical scores, source URLs, crawl
/// metadata) survive in [`extras`](Self::extras) via serde flattening.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    /// Primary key in the backing store, stringified.
    pub id: String,
    /// Official registration code (e.g. `DKL1234567890A1`). Unique where present.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub dosage_form: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default)]
    pub composition: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Free-form registry state. Parse with [`ProductStatus::parse`] at the edge.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Stable 63-bit key into the vector index; absent until first embedding.
    #[serde(default)]
    pub faiss_id: Option<i64>,
    /// Provider fields preserved at the API boundary (`_score`, source URLs, ...).
    #[serde(flatten)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl ProductRecord {
    /// Minimal record with only the primary key set.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: None,
            name: None,
            manufacturer: None,
            dosage_form: None,
            strength: None,
            composition: None,
            category: None,
            status: None,
            updated_at: None,
            faiss_id: None,
            extras: serde_json::Map::new(),
        }
    }

    /// Provider lexical score stashed in `extras["_score"]`, clamped to [0, 1].
    pub fn lexical_score(&self) -> Option<f32> {
        self.extras
            .get("_score")
            .and_then(|v| v.as_f64())
            .map(|s| (s as f32).clamp(0.0, 1.0))
    }

    pub fn set_lexical_score(&mut self, score: f32) {
        self.extras.insert(
            "_score".to_string(),
            serde_json::json!(score.clamp(0.0, 1.0)),
        );
    }

    /// Registry status parsed into the closed sum type.
    pub fn parsed_status(&self) -> ProductStatus {
        match &self.status {
            Some(s) => ProductStatus::parse(s),
            None => ProductStatus::Unspecified,
        }
    }

    /// Text fed to the embedder: non-empty descriptive fields joined with `" | "`.
    pub fn composed_text(&self) -> String {
        [
            &self.name,
            &self.dosage_form,
            &self.strength,
            &self.composition,
            &self.manufacturer,
        ]
        .into_iter()
        .filter_map(|f| f.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
    }
}

/// Closed interpretation of the free-form registry status string.
///
/// The observed value set comes straight from crawled catalog data; anything
/// outside it lands in [`ProductStatus::Other`] so a new upstream label never
/// panics the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Valid,
    Registered,
    Active,
    Aktif,
    Invalid,
    Revoked,
    Expired,
    Nonaktif,
    NotRegistered,
    /// Status field absent on the record.
    Unspecified,
    /// Present but not one of the observed values.
    Other(String),
}

impl ProductStatus {
    /// Case-insensitive mapping from the raw registry string.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "valid" => Self::Valid,
            "registered" => Self::Registered,
            "active" => Self::Active,
            "aktif" => Self::Aktif,
            "invalid" => Self::Invalid,
            "revoked" => Self::Revoked,
            "expired" => Self::Expired,
            "nonaktif" => Self::Nonaktif,
            "not_registered" => Self::NotRegistered,
            "" => Self::Unspecified,
            other => Self::Other(other.to_string()),
        }
    }

    /// True for states that mean "this registration is in good standing".
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Self::Valid | Self::Registered | Self::Active | Self::Aktif
        )
    }

    /// True for states that mean "not registered / no longer registered".
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Self::Invalid | Self::Revoked | Self::Expired | Self::Nonaktif | Self::NotRegistered
        )
    }
}

/// Stable 63-bit vector-index id for a catalog key.
///
/// First 8 bytes of `sha1(key)` as an unsigned big-endian integer, masked to
/// 63 bits. The mask keeps the value non-negative so it can never collide
/// with the index's [`VECTOR_ID_SENTINEL`].
pub fn stable_id(key: &str) -> i64 {
    let digest = Sha1::digest(key.as_bytes());
    let mut first8 = [0u8; 8];
    first8.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(first8) & ((1u64 << 63) - 1)) as i64
}
