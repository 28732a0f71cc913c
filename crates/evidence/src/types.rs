use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a piece of evidence came from. Trust decreases top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceSource {
    /// The official catalog (exact or lexical tier).
    OfficialRegistry,
    /// Semantic vector retrieval over the same catalog.
    Vector,
    /// External web lookups.
    Web,
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvidenceSource::OfficialRegistry => "official-registry",
            EvidenceSource::Vector => "vector",
            EvidenceSource::Web => "web",
        };
        f.write_str(s)
    }
}

/// Ordinal quality of a match, used as a multiplier in scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrength {
    Exact,
    Strong,
    Medium,
    Weak,
    #[serde(rename = "none")]
    NoMatch,
}

impl MatchStrength {
    /// Thresholds shared by the lexical and vector tiers.
    pub fn from_provider_score(score: f32) -> Self {
        if score >= 0.85 {
            MatchStrength::Strong
        } else if score >= 0.70 {
            MatchStrength::Medium
        } else {
            MatchStrength::Weak
        }
    }

    /// Exact-tier comparison of the normalized query against a candidate's
    /// code and name: equality → exact, substring either way → strong,
    /// anything else → medium (the exact tier already found *something*).
    pub fn from_exact_compare(query: &str, code: Option<&str>, name: Option<&str>) -> Self {
        let q = query.trim().to_lowercase();
        for field in [code, name].into_iter().flatten() {
            let f = field.trim().to_lowercase();
            if f == q {
                return MatchStrength::Exact;
            }
            if f.contains(&q) || q.contains(&f) {
                return MatchStrength::Strong;
            }
        }
        MatchStrength::Medium
    }
}

/// One weighted observation about a candidate product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub source: EvidenceSource,
    pub product_id: Option<String>,
    pub name: Option<String>,
    /// Raw provider fields; the aggregator reads `status`/`state` and the
    /// `not_found`/`unregistered` markers out of here.
    pub payload: Value,
    pub match_strength: MatchStrength,
    /// Data-completeness heuristic in [0, 1].
    pub quality: f32,
    /// Recency of the candidate's timestamp in [0, 1].
    pub recency_factor: f32,
    /// Confidence in the query side (OCR/regex) in [0, 1].
    pub name_confidence: f32,
    /// Provider-native score where one exists (lexical rank, vector sim).
    pub provider_score: f32,
    pub reasons: Vec<String>,
}

impl Evidence {
    /// Neutral starting point; callers fill in what they know.
    pub fn new(source: EvidenceSource) -> Self {
        Self {
            source,
            product_id: None,
            name: None,
            payload: Value::Null,
            match_strength: MatchStrength::NoMatch,
            quality: 0.5,
            recency_factor: 0.6,
            name_confidence: 1.0,
            provider_score: 0.0,
            reasons: Vec::new(),
        }
    }

    pub fn with_match_strength(mut self, strength: MatchStrength) -> Self {
        self.match_strength = strength;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    /// Whether the provider reported "this product was not found /
    /// unregistered" rather than a candidate.
    pub(crate) fn is_negative_signal(&self) -> bool {
        let truthy = |v: &Value| match v {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => true,
        };
        self.payload
            .get("not_found")
            .map(&truthy)
            .unwrap_or(false)
            || self.payload.get("unregistered").map(&truthy).unwrap_or(false)
    }
}

/// Final verdict over a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Valid,
    Invalid,
    Unknown,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Valid => "valid",
            Decision::Invalid => "invalid",
            Decision::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregator's output: a decision plus the full ranked trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub decision: Decision,
    pub confidence: f32,
    pub top_source: EvidenceSource,
    pub explanation: String,
    pub winner: Option<Evidence>,
    /// Every contributed evidence, in insertion order.
    pub all_evidence: Vec<Evidence>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_score_thresholds() {
        assert_eq!(MatchStrength::from_provider_score(0.85), MatchStrength::Strong);
        assert_eq!(MatchStrength::from_provider_score(0.84), MatchStrength::Medium);
        assert_eq!(MatchStrength::from_provider_score(0.70), MatchStrength::Medium);
        assert_eq!(MatchStrength::from_provider_score(0.69), MatchStrength::Weak);
    }

    #[test]
    fn exact_compare_ladder() {
        assert_eq!(
            MatchStrength::from_exact_compare("DKL123", Some("dkl123"), None),
            MatchStrength::Exact
        );
        assert_eq!(
            MatchStrength::from_exact_compare("cetamol", None, Some("Paracetamol 500")),
            MatchStrength::Strong
        );
        assert_eq!(
            MatchStrength::from_exact_compare("ibuprofen", Some("DKL123"), Some("Paracetamol")),
            MatchStrength::Medium
        );
    }

    #[test]
    fn negative_signal_detection() {
        let ev = Evidence::new(EvidenceSource::Web)
            .with_payload(serde_json::json!({"not_found": true}));
        assert!(ev.is_negative_signal());

        let ev = Evidence::new(EvidenceSource::Web)
            .with_payload(serde_json::json!({"unregistered": "yes"}));
        assert!(ev.is_negative_signal());

        let ev = Evidence::new(EvidenceSource::Web)
            .with_payload(serde_json::json!({"name": "something"}));
        assert!(!ev.is_negative_signal());
    }
}
