//! Verification use case: query or scan → retrieval → evidence → decision.
//!
//! This is the layer that knows how retrieval hits become evidence. The
//! tier-to-source mapping is fixed: the exact and lexical tiers both speak
//! for the official registry, the vector and hybrid tiers for semantic
//! retrieval over it.

use std::sync::Arc;

use tracing::warn;

use catalog::Registry;
use evidence::{
    aggregate, recency_factor, record_quality, Evidence, EvidenceSource, MatchStrength,
    VerificationResult,
};
use normalize::{clean_code, parse_query};
use retrieval::{Hit, HitSource, RetrievalRouter, SearchError};
use scan::ScanResult;

/// How many runner-up hits contribute evidence alongside the best one.
const EVIDENCE_DEPTH: usize = 3;

/// Convert one retrieval hit into evidence.
///
/// `query` drives the exact-tier match-strength comparison;
/// `name_confidence` carries the OCR/regex confidence of the query side
/// (1.0 for typed queries).
pub fn evidence_from_hit(hit: &Hit, query: &str, name_confidence: f32) -> Evidence {
    let source = match hit.source {
        HitSource::Exact | HitSource::Lex => EvidenceSource::OfficialRegistry,
        HitSource::Vector | HitSource::Hybrid => EvidenceSource::Vector,
    };

    let match_strength = match hit.source {
        HitSource::Exact => MatchStrength::from_exact_compare(
            query,
            hit.record.code.as_deref(),
            hit.record.name.as_deref(),
        ),
        _ => MatchStrength::from_provider_score(hit.score),
    };

    let payload = serde_json::to_value(&hit.record).unwrap_or(serde_json::Value::Null);

    let mut ev = Evidence::new(source)
        .with_match_strength(match_strength)
        .with_payload(payload)
        .with_reason(format!("{} tier hit, score {:.3}", hit.source, hit.score));
    ev.product_id = hit.record.code.clone().or_else(|| Some(hit.record.id.clone()));
    ev.name = hit.record.name.clone();
    ev.quality = record_quality(&hit.record, source);
    ev.recency_factor = recency_factor(hit.record.updated_at);
    ev.name_confidence = name_confidence.clamp(0.0, 1.0);
    ev.provider_score = hit.score;
    ev
}

/// Query/scan verification against the catalog.
pub struct VerificationService {
    registry: Arc<dyn Registry>,
    router: Arc<RetrievalRouter>,
}

impl VerificationService {
    pub fn new(registry: Arc<dyn Registry>, router: Arc<RetrievalRouter>) -> Self {
        Self { registry, router }
    }

    /// Verify a typed query (registration code or free-form title).
    pub async fn verify_query(&self, query: &str) -> Result<VerificationResult, SearchError> {
        let parsed = parse_query(query);
        // An embedded code beats fuzzy matching on the surrounding prose.
        let effective = parsed.code.clone().unwrap_or_else(|| query.trim().to_string());

        let hits = self.router.search(&effective, EVIDENCE_DEPTH).await?;
        let evidence: Vec<Evidence> = hits
            .iter()
            .map(|h| evidence_from_hit(h, &effective, 1.0))
            .collect();
        let result = aggregate(evidence);

        let audit_key = parsed.code.map(|c| clean_code(&c)).unwrap_or(effective);
        self.audit(&audit_key, &result).await;
        Ok(result)
    }

    /// Verify a completed scan. The extracted registration code is the
    /// strongest signal; the title match is the fallback.
    pub async fn verify_scan(&self, scan: &ScanResult) -> Result<VerificationResult, SearchError> {
        let mut evidence: Vec<Evidence> = Vec::new();
        let mut audit_key: Option<String> = None;

        if let Some(code) = &scan.code {
            audit_key = Some(clean_code(code));
            let name_conf = scan.code_conf.unwrap_or(0.9);
            let hits = self.router.search(code, EVIDENCE_DEPTH).await?;
            evidence.extend(hits.iter().map(|h| evidence_from_hit(h, code, name_conf)));
        }

        if let Some(m) = &scan.match_ {
            let title = scan.title_text.as_deref().unwrap_or("");
            let hit = Hit {
                record: m.product.clone(),
                score: m.confidence,
                source: m.source,
            };
            let name_conf = scan.title_conf.unwrap_or(0.5);
            evidence.push(evidence_from_hit(&hit, title, name_conf));
            if audit_key.is_none() {
                audit_key = m.product.code.clone();
            }
        } else if evidence.is_empty() {
            // No code, no precomputed match: fall back to searching the
            // extracted title, when there is one.
            if let Some(title) = &scan.title_text {
                let name_conf = scan.title_conf.unwrap_or(0.5);
                let hits = self.router.search(title, EVIDENCE_DEPTH).await?;
                evidence.extend(hits.iter().map(|h| evidence_from_hit(h, title, name_conf)));
            }
        }

        let result = aggregate(evidence);
        let key = audit_key
            .or_else(|| scan.title_text.clone())
            .unwrap_or_else(|| "unreadable-scan".to_string());
        self.audit(&key, &result).await;
        Ok(result)
    }

    /// Audit failures must never fail a verification; log and move on.
    async fn audit(&self, key: &str, result: &VerificationResult) {
        if let Err(e) = self
            .registry
            .save_audit(key, result.decision.as_str())
            .await
        {
            warn!(key, error = %e, "audit write failed");
        }
    }
}
