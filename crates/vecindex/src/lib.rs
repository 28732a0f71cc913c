//! Adaptive on-disk vector index.
//!
//! Two modes behind one handle:
//!
//! - **Flat**: exact brute-force squared-L2 scan. Selected for small
//!   corpora (fewer than [`TRAIN_FLOOR`] training samples), when the
//!   `force_flat` flag is set, and as the fallback for every failure in the
//!   quantized path.
//! - **IvfPq**: inverted file + product quantization, `nlist` adapted to
//!   the training sample count as `clamp(2·√n, 16, nlist_max)`.
//!
//! The id mapping lives inside the index: every stored row carries its
//! caller-assigned 63-bit id, and `search` returns `(id, distance)` pairs
//! with the `-1` sentinel filtered out. Raw distances are NOT similarities;
//! mapping them into [0, 1] is the retrieval layer's concern.
//!
//! Persistence is bincode + zstd to a single file, written atomically
//! (temp file + rename) so readers never observe a torn index, with a
//! best-effort JSON sidecar of stored ids for operator tooling.
//!
//! `train`/`add` are CPU-bound; callers on an async runtime run them under
//! `spawn_blocking`.

mod error;
mod flat;
mod ivfpq;
mod kmeans;

pub use error::IndexError;
pub use flat::FlatIndex;
pub use ivfpq::IvfPqIndex;

use std::path::PathBuf;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bump when the persisted layout changes.
pub const INDEX_FORMAT_VERSION: u16 = 1;

/// Minimum training samples for the quantized mode.
pub const TRAIN_FLOOR: usize = 256;

/// Id the index returns for "no neighbor in this slot"; filtered before
/// results reach callers.
pub const ID_SENTINEL: i64 = -1;

/// Construction-time knobs for the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VecIndexConfig {
    #[serde(default = "VecIndexConfig::default_dim")]
    pub dim: usize,
    /// Upper bound for the adaptive `nlist`.
    #[serde(default = "VecIndexConfig::default_nlist_max")]
    pub nlist_max: usize,
    #[serde(default = "VecIndexConfig::default_nprobe")]
    pub nprobe: usize,
    /// Subquantizer count; must divide `dim`.
    #[serde(default = "VecIndexConfig::default_pq_m")]
    pub pq_m: usize,
    /// Skip quantization entirely and stay exact.
    #[serde(default)]
    pub force_flat: bool,
    /// On-disk location of the index file.
    #[serde(default = "VecIndexConfig::default_path")]
    pub path: PathBuf,
}

impl VecIndexConfig {
    fn default_dim() -> usize {
        1536
    }

    fn default_nlist_max() -> usize {
        4096
    }

    fn default_nprobe() -> usize {
        16
    }

    fn default_pq_m() -> usize {
        16
    }

    fn default_path() -> PathBuf {
        PathBuf::from("data/vectors/products.index")
    }

    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_pq_m(mut self, pq_m: usize) -> Self {
        self.pq_m = pq_m;
        self
    }

    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe;
        self
    }

    pub fn with_force_flat(mut self, force: bool) -> Self {
        self.force_flat = force;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// `clamp(2·√n, 16, nlist_max)`: more lists for bigger corpora, never
    /// fewer than 16.
    fn adaptive_nlist(&self, n_train: usize) -> usize {
        if n_train == 0 {
            return 16;
        }
        let guess = (2.0 * (n_train as f64).sqrt()) as usize;
        guess.clamp(16, self.nlist_max)
    }
}

impl Default for VecIndexConfig {
    fn default() -> Self {
        Self {
            dim: Self::default_dim(),
            nlist_max: Self::default_nlist_max(),
            nprobe: Self::default_nprobe(),
            pq_m: Self::default_pq_m(),
            force_flat: false,
            path: Self::default_path(),
        }
    }
}

/// Which backing structure the index is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    Flat,
    IvfPq,
}

#[derive(Serialize, Deserialize)]
enum Kind {
    Flat(FlatIndex),
    IvfPq(IvfPqIndex),
}

#[derive(Deserialize)]
struct PersistedIndex {
    version: u16,
    kind: Kind,
}

// Borrowed twin of `PersistedIndex` so persisting doesn't clone the index.
#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    version: u16,
    kind: &'a Kind,
}

/// The serving handle: mode selection, training, id-mapped add/search, and
/// atomic persistence.
pub struct VectorIndex {
    cfg: VecIndexConfig,
    kind: Option<Kind>,
}

impl VectorIndex {
    /// Empty, untrained state.
    pub fn empty(cfg: VecIndexConfig) -> Self {
        Self { cfg, kind: None }
    }

    /// Open the on-disk index if present. Read or decode failures degrade
    /// to the empty state; callers observe `is_trained() == false` rather
    /// than an error, and a rebuild heals the file.
    pub fn load(cfg: VecIndexConfig) -> Self {
        let path = cfg.path.clone();
        if !path.exists() {
            debug!(path = %path.display(), "no index on disk; will create on train/add");
            return Self::empty(cfg);
        }
        let kind = std::fs::read(&path)
            .map_err(IndexError::from)
            .and_then(|bytes| {
                let raw = zstd::decode_all(bytes.as_slice())
                    .map_err(|e| IndexError::Decode(e.to_string()))?;
                let (persisted, _): (PersistedIndex, _) =
                    bincode::serde::decode_from_slice(&raw, bincode::config::standard())
                        .map_err(|e| IndexError::Decode(e.to_string()))?;
                if persisted.version != INDEX_FORMAT_VERSION {
                    return Err(IndexError::Decode(format!(
                        "unsupported index format version {}",
                        persisted.version
                    )));
                }
                Ok(persisted.kind)
            });
        match kind {
            Ok(mut kind) => {
                if let Kind::IvfPq(ivf) = &mut kind {
                    ivf.set_nprobe(cfg.nprobe);
                }
                let loaded = Self {
                    cfg,
                    kind: Some(kind),
                };
                debug!(mode = ?loaded.mode(), ntotal = loaded.ntotal(), "loaded index");
                loaded
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index unreadable, starting empty");
                Self::empty(cfg)
            }
        }
    }

    pub fn is_trained(&self) -> bool {
        self.kind.is_some()
    }

    pub fn mode(&self) -> Option<IndexMode> {
        match &self.kind {
            Some(Kind::Flat(_)) => Some(IndexMode::Flat),
            Some(Kind::IvfPq(_)) => Some(IndexMode::IvfPq),
            None => None,
        }
    }

    pub fn ntotal(&self) -> usize {
        match &self.kind {
            Some(Kind::Flat(f)) => f.ntotal(),
            Some(Kind::IvfPq(q)) => q.ntotal(),
            None => 0,
        }
    }

    /// Select a mode and train on `data`. Idempotent: training an already
    /// trained index is a no-op. Any quantized-path failure falls back to
    /// flat; after this call `is_trained()` is always true.
    pub fn train(&mut self, data: &Array2<f32>) -> Result<(), IndexError> {
        if self.kind.is_some() {
            debug!("train: already trained");
            return Ok(());
        }
        let n = data.nrows();
        if n == 0 {
            self.kind = Some(Kind::Flat(FlatIndex::new(self.cfg.dim)));
            return Ok(());
        }
        self.check_width(data)?;

        if self.cfg.force_flat || n < TRAIN_FLOOR {
            debug!(n, "train: flat mode");
            self.kind = Some(Kind::Flat(FlatIndex::new(self.cfg.dim)));
            return Ok(());
        }

        let nlist = self.cfg.adaptive_nlist(n);
        let flat_data = flatten(data);
        match IvfPqIndex::train(
            &flat_data,
            n,
            self.cfg.dim,
            nlist,
            self.cfg.pq_m,
            self.cfg.nprobe,
        ) {
            Ok(ivf) => {
                debug!(n, nlist, "train: ivfpq mode");
                self.kind = Some(Kind::IvfPq(ivf));
            }
            Err(e) => {
                warn!(error = %e, "ivfpq training failed, falling back to flat");
                self.kind = Some(Kind::Flat(FlatIndex::new(self.cfg.dim)));
            }
        }
        Ok(())
    }

    /// Add id-mapped rows. An untrained index trains on the incoming batch
    /// first (falling back to flat when the batch is too small), so an add
    /// never observes an untrained index.
    pub fn add(&mut self, data: &Array2<f32>, ids: &[i64]) -> Result<(), IndexError> {
        if data.nrows() != ids.len() {
            return Err(IndexError::LengthMismatch {
                vectors: data.nrows(),
                ids: ids.len(),
            });
        }
        if let Some(&bad) = ids.iter().find(|&&id| id < 0) {
            return Err(IndexError::InvalidId(bad));
        }
        self.check_width(data)?;

        if self.kind.is_none() {
            debug!("add: index not trained, training on incoming batch");
            self.train(data)?;
        }

        let flat_data = flatten(data);
        match self.kind.as_mut() {
            Some(Kind::Flat(f)) => f.add(&flat_data, ids),
            Some(Kind::IvfPq(q)) => q.add(&flat_data, ids),
            None => unreachable!("train() always leaves a kind in place"),
        }
    }

    /// Up to `k` `(id, distance)` pairs, nearest first, sentinel filtered.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>, IndexError> {
        let hits = match &self.kind {
            None => return Ok(Vec::new()),
            Some(Kind::Flat(f)) => {
                if f.ntotal() == 0 {
                    return Ok(Vec::new());
                }
                f.search(query, k)?
            }
            Some(Kind::IvfPq(q)) => q.search(query, k)?,
        };
        Ok(hits.into_iter().filter(|(id, _)| *id != ID_SENTINEL).collect())
    }

    /// Atomic write of the index file plus a best-effort id sidecar.
    pub fn persist(&self) -> Result<(), IndexError> {
        let Some(kind) = &self.kind else {
            return Ok(());
        };
        if let Some(parent) = self.cfg.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let persisted = PersistedIndexRef {
            version: INDEX_FORMAT_VERSION,
            kind,
        };
        let raw = bincode::serde::encode_to_vec(&persisted, bincode::config::standard())
            .map_err(|e| IndexError::Encode(e.to_string()))?;
        let compressed =
            zstd::encode_all(raw.as_slice(), 3).map_err(|e| IndexError::Encode(e.to_string()))?;

        let tmp = self.cfg.path.with_extension("tmp");
        std::fs::write(&tmp, &compressed)?;
        std::fs::rename(&tmp, &self.cfg.path)?;

        // Sidecar is diagnostics only; failure to write it is not an error.
        let ids = match kind {
            Kind::Flat(f) => f.ids().to_vec(),
            Kind::IvfPq(q) => q.ids(),
        };
        let sidecar = self.cfg.path.with_extension("ids.json");
        if let Err(e) = serde_json::to_vec(&ids)
            .map_err(|e| IndexError::Encode(e.to_string()))
            .and_then(|bytes| std::fs::write(&sidecar, bytes).map_err(IndexError::from))
        {
            warn!(error = %e, "failed to write id sidecar");
        }

        debug!(path = %self.cfg.path.display(), ntotal = self.ntotal(), "persisted index");
        Ok(())
    }

    fn check_width(&self, data: &Array2<f32>) -> Result<(), IndexError> {
        if data.nrows() > 0 && data.ncols() != self.cfg.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.cfg.dim,
                got: data.ncols(),
            });
        }
        Ok(())
    }
}

/// Row-major copy of the matrix contents.
fn flatten(data: &Array2<f32>) -> Vec<f32> {
    data.iter().copied().collect()
}
