//! Time-boxed snapshot cache.
//!
//! In-memory, process-lifetime only: everything here is re-derivable from
//! the upstream service, so nothing persists across restarts. There is no
//! request coalescing; concurrent cache-missers each fetch independently.
//! That duplicates the occasional upstream call, which is acceptable
//! because upstream calls are paced and idempotent.
//!
//! Expired entries stay retrievable through [`SnapshotCache::get_stale`]
//! until overwritten or invalidated, so the boundary layer can serve a
//! stale snapshot when a fresh fetch fails.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::{OutageSnapshot, QueryKey};

/// A cached snapshot plus its validity window.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: OutageSnapshot,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Valid while `now - fetched_at < ttl`.
    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }

    /// Age of the entry.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Memoizes the last successful snapshot per query key.
pub struct SnapshotCache {
    entries: RwLock<HashMap<QueryKey, CacheEntry>>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fresh snapshot for the key, if any.
    pub async fn get(&self, key: &QueryKey) -> Option<OutageSnapshot> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.is_fresh() {
            debug!("cache hit ({:?}, age {:?})", key, entry.age());
            Some(entry.snapshot.clone())
        } else {
            None
        }
    }

    /// Snapshot for the key regardless of freshness. The boolean is true
    /// when the entry has expired.
    pub async fn get_stale(&self, key: &QueryKey) -> Option<(OutageSnapshot, bool)> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        Some((entry.snapshot.clone(), !entry.is_fresh()))
    }

    /// Store a snapshot, overwriting any previous entry for the key.
    pub async fn put(&self, key: QueryKey, snapshot: OutageSnapshot) {
        let entry = CacheEntry {
            snapshot,
            fetched_at: Instant::now(),
            ttl: self.ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Remove one entry.
    pub async fn invalidate(&self, key: &QueryKey) {
        self.entries.write().await.remove(key);
    }

    /// Clear the whole cache.
    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        let n = entries.len();
        entries.clear();
        debug!("cache cleared ({n} entries)");
    }

    /// Number of entries, fresh or expired.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutageSummary, SourceMetadata};

    fn snapshot(total: usize) -> OutageSnapshot {
        OutageSnapshot {
            summary: OutageSummary {
                total_outages: total,
                total_customers_affected: 0,
                last_updated: "2026-08-29T12:00:00Z".to_string(),
                data_source: "test".to_string(),
            },
            outages: vec![],
            metadata: SourceMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let cache = SnapshotCache::new(Duration::from_secs(300));
        let key = QueryKey::full(100);

        assert!(cache.get(&key).await.is_none());
        cache.put(key.clone(), snapshot(7)).await;

        let got = cache.get(&key).await.unwrap();
        assert_eq!(got.summary.total_outages, 7);
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache = SnapshotCache::new(Duration::ZERO);
        let key = QueryKey::full(100);
        cache.put(key.clone(), snapshot(1)).await;

        // Zero TTL — immediately expired for get, still reachable stale
        assert!(cache.get(&key).await.is_none());
        let (snap, stale) = cache.get_stale(&key).await.unwrap();
        assert!(stale);
        assert_eq!(snap.summary.total_outages, 1);
    }

    #[tokio::test]
    async fn test_key_isolation() {
        let cache = SnapshotCache::new(Duration::from_secs(300));
        let bbox = crate::model::BoundingBox {
            north: 28.7,
            south: 27.0,
            east: -79.9,
            west: -84.7,
        };
        cache.put(QueryKey::full(100), snapshot(1)).await;
        cache
            .put(QueryKey::bounded(&bbox, 100), snapshot(2))
            .await;

        assert_eq!(
            cache.get(&QueryKey::full(100)).await.unwrap().summary.total_outages,
            1
        );
        assert_eq!(
            cache
                .get(&QueryKey::bounded(&bbox, 100))
                .await
                .unwrap()
                .summary
                .total_outages,
            2
        );
    }

    #[tokio::test]
    async fn test_invalidation() {
        let cache = SnapshotCache::new(Duration::from_secs(300));
        let key = QueryKey::full(100);
        cache.put(key.clone(), snapshot(1)).await;
        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
        assert!(cache.get_stale(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = SnapshotCache::new(Duration::from_secs(300));
        cache.put(QueryKey::full(1), snapshot(1)).await;
        cache.put(QueryKey::full(2), snapshot(2)).await;
        assert_eq!(cache.len().await, 2);

        cache.invalidate_all().await;
        assert!(cache.is_empty().await);
    }
}
