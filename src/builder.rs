//! Streaming index build job.
//!
//! Walks the product catalog, assigns stable vector ids, embeds composed
//! texts in fixed-size batches, trains the index once enough samples have
//! accumulated, and persists the result. Peak memory is bounded by the
//! embedding batch on the steady path and the training buffer before the
//! first train.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use ndarray::Array2;
use thiserror::Error;
use tracing::{debug, info};

use catalog::{stable_id, CatalogError, ProductRecord, Registry};
use embed::{EmbedError, Embedder};
use vecindex::{IndexError, IndexMode, VecIndexConfig, VectorIndex};

/// Deterministic seed for the training subsample.
const SUBSAMPLE_SEED: u64 = 42;

/// Builder knobs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct BuildConfig {
    /// Texts embedded per provider call.
    #[serde(default = "BuildConfig::default_batch_size")]
    pub batch_size: usize,
    /// Buffered samples required before the index trains.
    #[serde(default = "BuildConfig::default_train_samples")]
    pub train_samples: usize,
}

impl BuildConfig {
    fn default_batch_size() -> usize {
        512
    }

    fn default_train_samples() -> usize {
        20_000
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
            train_samples: Self::default_train_samples(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("embed error: {0}")]
    Embed(#[from] EmbedError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("worker error: {0}")]
    Worker(String),
}

/// What a build run did.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BuildReport {
    pub docs_seen: usize,
    pub docs_indexed: usize,
    /// Documents with an empty composed text; they stay in the catalog but
    /// are not embeddable.
    pub docs_skipped: usize,
    pub trained: bool,
    pub mode: Option<IndexMode>,
}

/// The built index plus its report. The caller swaps `index` into the
/// router's handle and decides when to persist a new generation.
pub struct BuildOutcome {
    pub index: VectorIndex,
    pub report: BuildReport,
}

/// Streaming embed-train-add job over catalog documents.
pub struct IndexBuilder {
    registry: Arc<dyn Registry>,
    embedder: Arc<dyn Embedder>,
    cfg: BuildConfig,
    index_cfg: VecIndexConfig,
}

// Accumulated embeddings waiting for the first training pass.
struct TrainBuffer {
    vectors: Vec<f32>,
    ids: Vec<i64>,
    dim: usize,
}

impl TrainBuffer {
    fn new(dim: usize) -> Self {
        Self {
            vectors: Vec::new(),
            ids: Vec::new(),
            dim,
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn push_batch(&mut self, vectors: Vec<Vec<f32>>, ids: &[i64]) {
        for v in &vectors {
            self.vectors.extend_from_slice(v);
        }
        self.ids.extend_from_slice(ids);
    }

    /// Up to `target` rows, randomly chosen, as a training matrix.
    fn subsample(&self, target: usize) -> Array2<f32> {
        let n = self.len();
        if n <= target {
            return Array2::from_shape_vec((n, self.dim), self.vectors.clone())
                .unwrap_or_else(|_| Array2::zeros((0, self.dim)));
        }
        let mut rng = fastrand::Rng::with_seed(SUBSAMPLE_SEED);
        let mut picks: Vec<usize> = (0..n).collect();
        rng.shuffle(&mut picks);
        picks.truncate(target);

        let mut out = Vec::with_capacity(target * self.dim);
        for &row in &picks {
            out.extend_from_slice(&self.vectors[row * self.dim..(row + 1) * self.dim]);
        }
        Array2::from_shape_vec((target, self.dim), out)
            .unwrap_or_else(|_| Array2::zeros((0, self.dim)))
    }

    fn full_matrix(&self) -> Array2<f32> {
        Array2::from_shape_vec((self.len(), self.dim), self.vectors.clone())
            .unwrap_or_else(|_| Array2::zeros((0, self.dim)))
    }
}

impl IndexBuilder {
    pub fn new(
        registry: Arc<dyn Registry>,
        embedder: Arc<dyn Embedder>,
        cfg: BuildConfig,
        index_cfg: VecIndexConfig,
    ) -> Self {
        Self {
            registry,
            embedder,
            cfg,
            index_cfg,
        }
    }

    /// Run the build over a stream of catalog documents.
    ///
    /// Until the index is trained, embedded batches accumulate in a buffer;
    /// the first time the buffer reaches `train_samples`, the index trains
    /// on a (possibly subsampled) view of it and the entire buffer is
    /// added. After that, batches are added directly. On stream end the
    /// tail is flushed and, if nothing ever trained, the index trains on
    /// whatever exists, falling back to flat below the quantization floor.
    pub async fn run<S>(&self, mut docs: S) -> Result<BuildOutcome, BuildError>
    where
        S: Stream<Item = ProductRecord> + Unpin,
    {
        let mut index = VectorIndex::load(self.index_cfg.clone());
        let mut trained = index.is_trained();
        let mut buffer = TrainBuffer::new(self.embedder.dim());
        let mut report = BuildReport::default();

        let mut batch_texts: Vec<String> = Vec::new();
        let mut batch_ids: Vec<i64> = Vec::new();

        while let Some(doc) = docs.next().await {
            report.docs_seen += 1;

            let fid = match doc.faiss_id {
                Some(fid) => fid,
                None => {
                    let fid = stable_id(&doc.id);
                    self.registry.set_faiss_id(&doc.id, fid).await?;
                    fid
                }
            };

            let text = doc.composed_text();
            if text.is_empty() {
                report.docs_skipped += 1;
                continue;
            }

            batch_texts.push(text);
            batch_ids.push(fid);

            if batch_texts.len() >= self.cfg.batch_size {
                let texts = std::mem::take(&mut batch_texts);
                let ids = std::mem::take(&mut batch_ids);
                index = self
                    .flush_batch(index, &mut trained, &mut buffer, texts, ids, &mut report)
                    .await?;
            }
        }

        // Tail batch.
        if !batch_texts.is_empty() {
            let texts = std::mem::take(&mut batch_texts);
            let ids = std::mem::take(&mut batch_ids);
            index = self
                .flush_batch(index, &mut trained, &mut buffer, texts, ids, &mut report)
                .await?;
        }

        // Small corpora never hit the training target: train on what we
        // have and add the whole buffer.
        if !trained && buffer.len() > 0 {
            index = self.train_and_add(index, &buffer, &mut report).await?;
            trained = true;
        }

        index = spawn_index_job(index, |idx| {
            idx.persist()?;
            Ok(())
        })
        .await?;

        report.trained = trained;
        report.mode = index.mode();
        info!(
            docs = report.docs_seen,
            indexed = report.docs_indexed,
            skipped = report.docs_skipped,
            mode = ?report.mode,
            "index build complete"
        );
        Ok(BuildOutcome { index, report })
    }

    async fn flush_batch(
        &self,
        mut index: VectorIndex,
        trained: &mut bool,
        buffer: &mut TrainBuffer,
        texts: Vec<String>,
        ids: Vec<i64>,
        report: &mut BuildReport,
    ) -> Result<VectorIndex, BuildError> {
        let vectors = self.embedder.embed_batch(&texts).await?;
        debug!(batch = texts.len(), "embedded batch");

        if *trained {
            let flat: Vec<f32> = vectors.iter().flatten().copied().collect();
            let mat = Array2::from_shape_vec((ids.len(), self.embedder.dim()), flat)
                .map_err(|e| BuildError::Worker(e.to_string()))?;
            let rows = mat.nrows();
            index = spawn_index_job(index, move |idx| idx.add(&mat, &ids)).await?;
            report.docs_indexed += rows;
            return Ok(index);
        }

        buffer.push_batch(vectors, &ids);
        if buffer.len() >= self.cfg.train_samples {
            index = self.train_and_add(index, buffer, report).await?;
            *buffer = TrainBuffer::new(self.embedder.dim());
            *trained = true;
        }
        Ok(index)
    }

    async fn train_and_add(
        &self,
        index: VectorIndex,
        buffer: &TrainBuffer,
        report: &mut BuildReport,
    ) -> Result<VectorIndex, BuildError> {
        let train_mat = buffer.subsample(self.cfg.train_samples);
        let full_mat = buffer.full_matrix();
        let ids = buffer.ids.clone();
        report.docs_indexed += full_mat.nrows();

        spawn_index_job(index, move |idx| {
            idx.train(&train_mat)?;
            idx.add(&full_mat, &ids)
        })
        .await
        .map_err(BuildError::from)
    }
}

/// Run a CPU-bound index operation off the async scheduler, handing the
/// index back afterwards.
async fn spawn_index_job<F>(mut index: VectorIndex, job: F) -> Result<VectorIndex, BuildError>
where
    F: FnOnce(&mut VectorIndex) -> Result<(), IndexError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        job(&mut index)?;
        Ok::<VectorIndex, IndexError>(index)
    })
    .await
    .map_err(|e| BuildError::Worker(e.to_string()))?
    .map_err(BuildError::from)
}
