use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::CatalogResult;

/// Default entry lifetime: 12 hours, matching the catalog's crawl cadence.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(43_200);

/// TTL key/value cache port.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> CatalogResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CatalogResult<()>;
    async fn delete(&self, key: &str) -> CatalogResult<()>;
}

/// In-process [`Cache`] with lazy expiry (entries are dropped on read).
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Value, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CatalogResult<Option<Value>> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if Instant::now() < *expires_at {
                return Ok(Some(value.clone()));
            }
        }
        // expired or absent
        self.entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CatalogResult<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CatalogResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let cache = MemoryCache::new();
        cache
            .set("k", serde_json::json!({"hit": true}), DEFAULT_CACHE_TTL)
            .await
            .unwrap();
        assert_eq!(
            cache.get("k").await.unwrap().unwrap()["hit"],
            serde_json::json!(true)
        );
        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_read_as_miss() {
        let cache = MemoryCache::new();
        cache
            .set("k", serde_json::json!(1), Duration::from_millis(0))
            .await
            .unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
