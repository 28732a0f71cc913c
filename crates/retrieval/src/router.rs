use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use tracing::{debug, warn};

use catalog::Registry;
use embed::Embedder;
use normalize::{is_noisy, looks_like_code};
use vecindex::VectorIndex;

use crate::types::{Hit, HitSource, RouterConfig, SearchError};

const LEX_WEIGHT: f32 = 0.6;
const VEC_WEIGHT: f32 = 0.4;

/// Blended exact → lexical → vector search over the catalog.
///
/// Holds a read-mostly handle on the vector index; the index build job
/// replaces the value behind the lock wholesale, so readers always see
/// either the old or the new generation.
pub struct RetrievalRouter {
    registry: Arc<dyn Registry>,
    embedder: Arc<dyn Embedder>,
    index: Arc<RwLock<VectorIndex>>,
    cfg: RouterConfig,
}

impl RetrievalRouter {
    pub fn new(
        registry: Arc<dyn Registry>,
        embedder: Arc<dyn Embedder>,
        index: Arc<RwLock<VectorIndex>>,
        cfg: RouterConfig,
    ) -> Self {
        Self {
            registry,
            embedder,
            index,
            cfg,
        }
    }

    /// Ordered hits for `query`, at most `k`, scores descending.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<Hit>, SearchError> {
        let q = query.trim();
        if q.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        // Exact tier. An ambiguous code (prefix shape but no registry hit)
        // falls through to the lexical tier.
        if looks_like_code(q) {
            if let Some(record) = self.registry.find_by_code(q).await? {
                debug!(query = q, "exact tier hit");
                return Ok(vec![Hit {
                    record,
                    score: self.cfg.exact_score,
                    source: HitSource::Exact,
                }]);
            }
        }

        // Lexical tier, always.
        let lex_records = self
            .registry
            .search_lexical(q, self.cfg.lex_limit, self.cfg.lex_index.as_deref())
            .await?;
        let lex_hits: Vec<Hit> = lex_records
            .into_iter()
            .map(|record| {
                let score = record.lexical_score().unwrap_or(0.0);
                Hit {
                    record,
                    score,
                    source: HitSource::Lex,
                }
            })
            .collect();
        let best_lex = lex_hits
            .iter()
            .map(|h| h.score)
            .fold(0.0f32, f32::max);

        // Vector tier gate.
        let use_vector =
            !self.cfg.disable_vector && (is_noisy(q) || best_lex < self.cfg.lex_score_floor);
        let vector_hits = if use_vector {
            match self.vector_tier(q).await {
                Ok(hits) => hits,
                Err(e) => {
                    // Non-fatal by design: a broken embedding provider or a
                    // cold index must not take lexical search down with it.
                    warn!(error = %e, "vector tier failed, serving lexical only");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        // Blend, keyed by code (fallback: primary id).
        let mut blended: HashMap<String, Hit> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for hit in lex_hits {
            let key = Hit::key(&hit.record);
            order.push(key.clone());
            blended.insert(key, hit);
        }
        for hit in vector_hits {
            let key = Hit::key(&hit.record);
            match blended.get_mut(&key) {
                Some(existing) => {
                    existing.score = LEX_WEIGHT * existing.score + VEC_WEIGHT * hit.score;
                    existing.source = HitSource::Hybrid;
                }
                None => {
                    order.push(key.clone());
                    blended.insert(key, hit);
                }
            }
        }

        let mut out: Vec<Hit> = order
            .into_iter()
            .filter_map(|key| blended.remove(&key))
            .collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(k);
        Ok(out)
    }

    /// The single best hit, when any.
    pub async fn search_best(&self, query: &str) -> Result<Option<Hit>, SearchError> {
        Ok(self.search(query, 1).await?.into_iter().next())
    }

    async fn vector_tier(&self, q: &str) -> Result<Vec<Hit>, SearchError> {
        let vector = self.embedder.embed(q).await?;
        let pairs = {
            let index = self.index.read().unwrap_or_else(|e| e.into_inner());
            index.search(&vector, self.cfg.vector_k)?
        };
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = pairs.iter().map(|(id, _)| *id).collect();
        let records = self.registry.get_by_int_ids(&ids).await?;
        let by_id: HashMap<i64, catalog::ProductRecord> = records
            .into_iter()
            .filter_map(|r| r.faiss_id.map(|fid| (fid, r)))
            .collect();

        Ok(pairs
            .into_iter()
            .filter_map(|(id, dist)| {
                let record = by_id.get(&id)?.clone();
                // Distance → similarity. Monotone and bounded; the exact
                // metric underneath doesn't matter to the blend.
                let sim = 1.0 / (1.0 + dist.max(0.0));
                Some(Hit {
                    record,
                    score: sim,
                    source: HitSource::Vector,
                })
            })
            .collect())
    }
}
