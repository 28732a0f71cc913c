use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use catalog::{ProductRecord, ProductStatus};

use crate::types::{Decision, Evidence, EvidenceSource, MatchStrength, VerificationResult};

fn source_weight(source: EvidenceSource) -> f32 {
    match source {
        EvidenceSource::OfficialRegistry => 0.95,
        EvidenceSource::Vector => 0.75,
        EvidenceSource::Web => 0.60,
    }
}

fn strength_multiplier(strength: MatchStrength) -> f32 {
    match strength {
        MatchStrength::Exact => 1.00,
        MatchStrength::Strong => 0.85,
        MatchStrength::Medium => 0.65,
        MatchStrength::Weak => 0.40,
        MatchStrength::NoMatch => 0.10,
    }
}

/// Score one evidence:
/// `W[source] · (0.45·M + 0.25·Q + 0.20·R + 0.10·N)`, clamped to [0, 1].
pub fn score_evidence(ev: &Evidence) -> f32 {
    let base = source_weight(ev.source);
    let m = strength_multiplier(ev.match_strength);
    let s = base
        * (0.45 * m
            + 0.25 * ev.quality.clamp(0.0, 1.0)
            + 0.20 * ev.recency_factor.clamp(0.0, 1.0)
            + 0.10 * ev.name_confidence.clamp(0.0, 1.0));
    s.clamp(0.0, 1.0)
}

/// Recency factor from a candidate's timestamp: fresher records weigh more,
/// an absent timestamp sits between the 3-year and older buckets.
pub fn recency_factor(updated_at: Option<DateTime<Utc>>) -> f32 {
    match updated_at {
        None => 0.60,
        Some(ts) => {
            let age = Utc::now().signed_duration_since(ts);
            if age <= Duration::days(365) {
                0.90
            } else if age <= Duration::days(3 * 365) {
                0.75
            } else {
                0.50
            }
        }
    }
}

/// Data-completeness heuristic: a source-dependent base plus 0.12 per
/// populated descriptive field, capped at 1.
pub fn record_quality(record: &ProductRecord, source: EvidenceSource) -> f32 {
    let base = match source {
        EvidenceSource::OfficialRegistry => 0.40,
        _ => 0.30,
    };
    let populated = [
        record.name.is_some(),
        record.manufacturer.is_some(),
        record.category.is_some(),
        record.composition.is_some(),
        record.status.is_some(),
        record.updated_at.is_some(),
    ]
    .iter()
    .filter(|&&p| p)
    .count();
    (base + 0.12 * populated as f32).min(1.0)
}

/// Fuse an evidence list into a decision.
///
/// The returned confidence always equals the winner's score, and
/// `all_evidence` preserves the caller's insertion order.
pub fn aggregate(evidence: Vec<Evidence>) -> VerificationResult {
    if evidence.is_empty() {
        return VerificationResult {
            decision: Decision::Unknown,
            confidence: 0.0,
            top_source: EvidenceSource::Web,
            explanation: "no evidence".to_string(),
            winner: None,
            all_evidence: Vec::new(),
        };
    }

    let mut ranked: Vec<&Evidence> = evidence.iter().collect();
    ranked.sort_by(|a, b| {
        score_evidence(b)
            .partial_cmp(&score_evidence(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let top = ranked[0];
    let top_score = score_evidence(top);

    let mut decision = Decision::Unknown;
    let mut explanation: Vec<String> = Vec::new();

    if top.source == EvidenceSource::OfficialRegistry
        && matches!(top.match_strength, MatchStrength::Exact | MatchStrength::Strong)
    {
        let status = top
            .payload
            .get("status")
            .or_else(|| top.payload.get("state"))
            .and_then(|v| v.as_str())
            .map(ProductStatus::parse)
            .unwrap_or(ProductStatus::Unspecified);

        if status.is_negative() {
            decision = Decision::Invalid;
            explanation.push("Official record indicates not registered/revoked.".to_string());
        } else if status.is_positive() {
            decision = Decision::Valid;
            explanation.push("Found matching record in the official registry.".to_string());
        } else {
            // Benefit of the doubt: a strong official match with an
            // unspecified status still counts as registered.
            decision = Decision::Valid;
            explanation
                .push("Official record found, status unspecified but treated as valid.".to_string());
        }
    }

    if decision == Decision::Unknown {
        let negatives = evidence.iter().filter(|ev| ev.is_negative_signal()).count();
        if negatives >= 2 && top_score >= 0.5 {
            decision = Decision::Invalid;
            explanation.push("Multiple sources suggest an unregistered product.".to_string());
        }
    }

    if explanation.is_empty() {
        explanation.push(format!(
            "Top evidence from {} with {:?} match.",
            top.source, top.match_strength
        ));
    }

    debug!(decision = %decision, confidence = top_score, source = %top.source, "aggregated evidence");

    VerificationResult {
        decision,
        confidence: top_score,
        top_source: top.source,
        explanation: explanation.join(" "),
        winner: Some(top.clone()),
        all_evidence: evidence,
    }
}
