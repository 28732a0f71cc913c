//! Index build job over an in-memory catalog.

use std::sync::Arc;

use futures::stream;
use medverify::{
    stable_id, BuildConfig, Embedder, IndexBuilder, IndexMode, MemoryRegistry, ProductRecord,
    StubEmbedder, VecIndexConfig, VectorIndex,
};

const DIM: usize = 64;

fn product(n: usize) -> ProductRecord {
    let mut rec = ProductRecord::new(format!("prod-{n}"));
    rec.code = Some(format!("DKL{n:010}"));
    rec.name = Some(format!("Obat Nomor {n}"));
    rec.dosage_form = Some("tablet".into());
    rec.composition = Some(format!("zat aktif {n}"));
    rec.manufacturer = Some("PT Farma Contoh".into());
    rec
}

fn blank_product(id: &str) -> ProductRecord {
    // No descriptive fields at all → empty composed text → not indexable.
    ProductRecord::new(id)
}

fn index_cfg(dir: &tempfile::TempDir) -> VecIndexConfig {
    VecIndexConfig::default()
        .with_dim(DIM)
        .with_pq_m(16)
        .with_path(dir.path().join("products.index"))
}

#[tokio::test(flavor = "multi_thread")]
async fn small_catalog_builds_flat_and_patches_ids() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(MemoryRegistry::new());
    for n in 0..30 {
        registry.insert(product(n));
    }
    registry.insert(blank_product("empty-1"));

    let builder = IndexBuilder::new(
        registry.clone(),
        Arc::new(StubEmbedder::new(DIM)),
        BuildConfig::default(),
        index_cfg(&dir),
    );

    let docs = registry.snapshot();
    let outcome = builder.run(stream::iter(docs)).await.unwrap();

    assert_eq!(outcome.report.docs_seen, 31);
    assert_eq!(outcome.report.docs_indexed, 30);
    assert_eq!(outcome.report.docs_skipped, 1);
    assert!(outcome.report.trained);
    assert_eq!(outcome.report.mode, Some(IndexMode::Flat));
    assert_eq!(outcome.index.ntotal(), 30);

    // Every document, indexable or not, got its stable id patched back.
    for rec in registry.snapshot() {
        assert_eq!(rec.faiss_id, Some(stable_id(&rec.id)));
        assert!(rec.faiss_id.unwrap() >= 0);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn indexed_text_recovers_its_own_id() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(MemoryRegistry::new());
    for n in 0..25 {
        registry.insert(product(n));
    }

    let embedder = Arc::new(StubEmbedder::new(DIM));
    let builder = IndexBuilder::new(
        registry.clone(),
        embedder.clone(),
        BuildConfig::default(),
        index_cfg(&dir),
    );
    let outcome = builder.run(stream::iter(registry.snapshot())).await.unwrap();

    // Flat mode is exact: querying with a composed text must return that
    // product's id at distance ~0, for every product.
    for rec in registry.snapshot() {
        let query = embedder.embed(&rec.composed_text()).await.unwrap();
        let hits = outcome.index.search(&query, 1).unwrap();
        assert_eq!(hits[0].0, rec.faiss_id.unwrap(), "id mismatch for {}", rec.id);
        assert!(hits[0].1 < 1e-5);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn build_persists_index_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = index_cfg(&dir);
    let registry = Arc::new(MemoryRegistry::new());
    for n in 0..10 {
        registry.insert(product(n));
    }

    let builder = IndexBuilder::new(
        registry.clone(),
        Arc::new(StubEmbedder::new(DIM)),
        BuildConfig::default(),
        cfg.clone(),
    );
    builder.run(stream::iter(registry.snapshot())).await.unwrap();

    assert!(cfg.path.exists());
    let reloaded = VectorIndex::load(cfg);
    assert!(reloaded.is_trained());
    assert_eq!(reloaded.ntotal(), 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn large_catalog_trains_quantized_mid_stream() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(MemoryRegistry::new());
    for n in 0..300 {
        registry.insert(product(n));
    }

    // Small batch + training target so the train happens mid-stream and
    // later batches take the direct-add path.
    let build_cfg = BuildConfig {
        batch_size: 64,
        train_samples: 256,
    };
    let builder = IndexBuilder::new(
        registry.clone(),
        Arc::new(StubEmbedder::new(DIM)),
        build_cfg,
        index_cfg(&dir),
    );
    let outcome = builder.run(stream::iter(registry.snapshot())).await.unwrap();

    assert!(outcome.report.trained);
    assert_eq!(outcome.report.mode, Some(IndexMode::IvfPq));
    assert_eq!(outcome.report.docs_indexed, 300);
    assert_eq!(outcome.index.ntotal(), 300);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_stream_leaves_index_untrained() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(MemoryRegistry::new());
    let builder = IndexBuilder::new(
        registry,
        Arc::new(StubEmbedder::new(DIM)),
        BuildConfig::default(),
        index_cfg(&dir),
    );
    let outcome = builder.run(stream::iter(Vec::<ProductRecord>::new())).await.unwrap();

    assert_eq!(outcome.report.docs_seen, 0);
    assert!(!outcome.report.trained);
    assert_eq!(outcome.index.ntotal(), 0);
    assert!(outcome.index.search(&vec![0.0; DIM], 5).unwrap().is_empty());
}
