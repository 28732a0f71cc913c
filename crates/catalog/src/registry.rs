use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CatalogResult;
use crate::record::ProductRecord;

/// One row of the append-only lookup audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub code: String,
    pub decision: String,
    pub ts: DateTime<Utc>,
}

/// Read interface over the official product catalog.
///
/// Implementations are expected to be connection-pooled and safe for
/// concurrent calls; all methods take `&self`.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Exact lookup by registration code (case-insensitive on the code).
    async fn find_by_code(&self, code: &str) -> CatalogResult<Option<ProductRecord>>;

    /// Lexical search. Returned records carry the provider's relevance score
    /// in `extras["_score"]`. `index_hint` names a provider-side search
    /// index when the backend distinguishes several.
    async fn search_lexical(
        &self,
        query: &str,
        limit: usize,
        index_hint: Option<&str>,
    ) -> CatalogResult<Vec<ProductRecord>>;

    /// Bulk lookup by vector-index ids (`faiss_id`). Unknown ids are skipped.
    async fn get_by_int_ids(&self, ids: &[i64]) -> CatalogResult<Vec<ProductRecord>>;

    /// Patch a record's `faiss_id` back into the catalog.
    async fn set_faiss_id(&self, id: &str, faiss_id: i64) -> CatalogResult<()>;

    /// Append a `(code, decision, now)` row to the audit log.
    async fn save_audit(&self, code: &str, decision: &str) -> CatalogResult<()>;
}

/// In-memory [`Registry`] used by tests, demos, and single-node setups.
///
/// Lexical scoring is a naive token-overlap ratio: deliberately simple, but
/// shaped like a real provider score (descending, in [0, 1]) so the router's
/// gating logic can be exercised against it.
#[derive(Default)]
pub struct MemoryRegistry {
    products: RwLock<Vec<ProductRecord>>,
    audits: RwLock<Vec<AuditEntry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<ProductRecord>) -> Self {
        Self {
            products: RwLock::new(products),
            audits: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, record: ProductRecord) {
        self.products.write().unwrap_or_else(|e| e.into_inner()).push(record);
    }

    pub fn len(&self) -> usize {
        self.products.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the audit log, oldest first.
    pub fn audits(&self) -> Vec<AuditEntry> {
        self.audits.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// All records, cloned. Drives the index build job in tests.
    pub fn snapshot(&self) -> Vec<ProductRecord> {
        self.products.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn overlap_score(query: &str, name: &str) -> f32 {
        let q_tokens: Vec<String> = query
            .to_ascii_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if q_tokens.is_empty() {
            return 0.0;
        }
        let name_lower = name.to_ascii_lowercase();
        let name_tokens: HashMap<&str, ()> =
            name_lower.split_whitespace().map(|t| (t, ())).collect();
        let hits = q_tokens
            .iter()
            .filter(|t| name_tokens.contains_key(t.as_str()))
            .count();
        hits as f32 / q_tokens.len() as f32
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn find_by_code(&self, code: &str) -> CatalogResult<Option<ProductRecord>> {
        let needle = code.trim().to_ascii_uppercase();
        let products = self.products.read().unwrap_or_else(|e| e.into_inner());
        Ok(products
            .iter()
            .find(|p| {
                p.code
                    .as_deref()
                    .is_some_and(|c| c.trim().eq_ignore_ascii_case(&needle))
            })
            .cloned())
    }

    async fn search_lexical(
        &self,
        query: &str,
        limit: usize,
        _index_hint: Option<&str>,
    ) -> CatalogResult<Vec<ProductRecord>> {
        let products = self.products.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<ProductRecord> = products
            .iter()
            .filter_map(|p| {
                let name = p.name.as_deref()?;
                let score = Self::overlap_score(query, name);
                if score <= 0.0 {
                    return None;
                }
                let mut hit = p.clone();
                hit.set_lexical_score(score);
                Some(hit)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.lexical_score()
                .partial_cmp(&a.lexical_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get_by_int_ids(&self, ids: &[i64]) -> CatalogResult<Vec<ProductRecord>> {
        let products = self.products.read().unwrap_or_else(|e| e.into_inner());
        Ok(products
            .iter()
            .filter(|p| p.faiss_id.is_some_and(|fid| ids.contains(&fid)))
            .cloned()
            .collect())
    }

    async fn set_faiss_id(&self, id: &str, faiss_id: i64) -> CatalogResult<()> {
        let mut products = self.products.write().unwrap_or_else(|e| e.into_inner());
        if let Some(p) = products.iter_mut().find(|p| p.id == id) {
            p.faiss_id = Some(faiss_id);
        }
        Ok(())
    }

    async fn save_audit(&self, code: &str, decision: &str) -> CatalogResult<()> {
        self.audits
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(AuditEntry {
                code: code.to_string(),
                decision: decision.to_string(),
                ts: Utc::now(),
            });
        Ok(())
    }
}
