//! End-to-end verification flows over in-memory ports.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use medverify::{
    stable_id, Decision, Embedder, EvidenceSource, MemoryRegistry, ProductRecord,
    RetrievalRouter, RouterConfig, StubEmbedder, VecIndexConfig, VectorIndex,
    VerificationService,
};

const DIM: usize = 64;

fn to_matrix(vectors: &[Vec<f32>]) -> ndarray::Array2<f32> {
    let n = vectors.len();
    let flat: Vec<f32> = vectors.iter().flatten().copied().collect();
    ndarray::Array2::from_shape_vec((n, DIM), flat).expect("consistent vector widths")
}

fn product(id: &str, code: &str, name: &str, status: &str) -> ProductRecord {
    let mut rec = ProductRecord::new(id);
    rec.code = Some(code.to_string());
    rec.name = Some(name.to_string());
    rec.status = Some(status.to_string());
    rec.updated_at = Some(Utc::now());
    rec
}

/// Registry + router + service over the given products, with the vector
/// index populated from their composed texts.
async fn fixture(products: Vec<ProductRecord>) -> (Arc<MemoryRegistry>, VerificationService) {
    let registry = Arc::new(MemoryRegistry::new());
    let embedder = Arc::new(StubEmbedder::new(DIM));

    let mut texts = Vec::new();
    let mut ids = Vec::new();
    for mut p in products {
        let fid = stable_id(&p.id);
        p.faiss_id = Some(fid);
        texts.push(p.composed_text());
        ids.push(fid);
        registry.insert(p);
    }

    let mut index = VectorIndex::empty(
        VecIndexConfig::default().with_dim(DIM).with_force_flat(true),
    );
    if !texts.is_empty() {
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        index.add(&to_matrix(&vectors), &ids).unwrap();
    }

    let router = Arc::new(RetrievalRouter::new(
        registry.clone(),
        embedder,
        Arc::new(RwLock::new(index)),
        RouterConfig::default(),
    ));
    let service = VerificationService::new(registry.clone(), router);
    (registry, service)
}

#[tokio::test(flavor = "multi_thread")]
async fn exact_code_query_verifies_valid() {
    let (registry, service) = fixture(vec![product(
        "1",
        "DKL1234567890A1",
        "Paracetamol 500",
        "valid",
    )])
    .await;

    let result = service.verify_query("dkl1234567890a1").await.unwrap();

    assert_eq!(result.decision, Decision::Valid);
    assert_eq!(result.top_source, EvidenceSource::OfficialRegistry);
    assert!(result.confidence >= 0.85, "confidence {}", result.confidence);
    let winner = result.winner.as_ref().unwrap();
    assert!(winner
        .product_id
        .as_deref()
        .unwrap()
        .eq_ignore_ascii_case("dkl1234567890a1"));

    // Audit row landed with the decision.
    let audits = registry.audits();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].decision, "valid");
}

#[tokio::test(flavor = "multi_thread")]
async fn revoked_record_verifies_invalid() {
    let (_registry, service) = fixture(vec![product(
        "1",
        "DKL1234567890A1",
        "Paracetamol 500",
        "revoked",
    )])
    .await;

    let result = service.verify_query("DKL1234567890A1").await.unwrap();
    assert_eq!(result.decision, Decision::Invalid);
}

#[tokio::test(flavor = "multi_thread")]
async fn noisy_title_fuses_tiers_and_reports_vector_source() {
    let (_registry, service) = fixture(vec![
        product("1", "DKL1", "Paracetamol 500", "valid"),
        product("2", "DKL2", "Amoxicillin Kapsul", "valid"),
    ])
    .await;

    // >15% symbols, so the vector tier must run alongside lexical and the
    // shared candidate comes back fused.
    let result = service.verify_query("paracetamol @@##").await.unwrap();
    let winner = result.winner.as_ref().unwrap();
    assert_eq!(winner.source, EvidenceSource::Vector); // hybrid maps here
    assert_eq!(winner.name.as_deref(), Some("Paracetamol 500"));
    assert!((result.confidence - medverify::aggregate(vec![winner.clone()]).confidence).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_catalog_is_unknown_with_zero_confidence() {
    let (registry, service) = fixture(Vec::new()).await;

    let result = service.verify_query("paracetamol").await.unwrap();
    assert_eq!(result.decision, Decision::Unknown);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.explanation, "no evidence");
    assert!(result.winner.is_none());
    assert_eq!(registry.audits()[0].decision, "unknown");
}

#[tokio::test(flavor = "multi_thread")]
async fn scan_with_extracted_code_verifies_valid() {
    let (registry, service) = fixture(vec![product(
        "1",
        "DKL1234567890",
        "Paracetamol 500",
        "valid",
    )])
    .await;

    // A completed scan whose regex task pulled out the registration number.
    let scan = sample_scan(Some("DKL1234567890"), None);
    let result = service.verify_scan(&scan).await.unwrap();

    assert_eq!(result.decision, Decision::Valid);
    assert_eq!(result.top_source, EvidenceSource::OfficialRegistry);
    assert_eq!(registry.audits()[0].code, "DKL1234567890");
}

#[tokio::test(flavor = "multi_thread")]
async fn scan_with_only_title_falls_back_to_search() {
    let (_registry, service) = fixture(vec![product(
        "1",
        "DKL1234567890",
        "Paracetamol 500",
        "valid",
    )])
    .await;

    let scan = sample_scan(None, Some("PARACETAMOL 500"));
    let result = service.verify_scan(&scan).await.unwrap();
    assert!(result.winner.is_some());
    assert_ne!(result.confidence, 0.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_scan_is_unknown() {
    let (registry, service) = fixture(Vec::new()).await;

    let scan = sample_scan(None, None);
    let result = service.verify_scan(&scan).await.unwrap();
    assert_eq!(result.decision, Decision::Unknown);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(registry.audits()[0].code, "unreadable-scan");
}

fn sample_scan(code: Option<&str>, title: Option<&str>) -> medverify::ScanResult {
    medverify::ScanResult {
        request_id: "test".into(),
        stage: medverify::ScanStage::Final,
        title_text: title.map(String::from),
        title_conf: title.map(|_| 0.88),
        code: code.map(String::from),
        code_conf: code.map(|_| 0.9),
        regex_skipped: code.is_none(),
        match_: None,
        boxes: Vec::new(),
        title_box: None,
        needs_more_input: code.is_none() && title.is_none(),
        suggestions: Vec::new(),
        timings: Default::default(),
    }
}
