//! Outage data service, the orchestrating facade.
//!
//! Composes the session manager, resilient HTTP client, query builder,
//! normalization pipeline, and snapshot cache into the two fetch
//! operations the boundary layer consumes. All state is interior-mutable,
//! so the service is shared by `Arc` across concurrent callers.

use reqwest::Method;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::acquisition::http_client::ResilientHttpClient;
use crate::acquisition::query::build_tiles_query;
use crate::acquisition::session::SessionManager;
use crate::cache::SnapshotCache;
use crate::config::{self, EngineConfig};
use crate::error::{EngineError, Result};
use crate::model::{BoundingBox, HealthStatus, OutageSnapshot, QueryKey};
use crate::normalize::pipeline;

/// The acquisition engine's public facade.
pub struct OutageDataService {
    config: EngineConfig,
    http: Arc<ResilientHttpClient>,
    session: SessionManager,
    cache: SnapshotCache,
}

impl OutageDataService {
    pub fn new(config: EngineConfig) -> Self {
        let http = Arc::new(ResilientHttpClient::new(
            config.rate_limit_delay,
            config.request_timeout,
        ));
        let session = SessionManager::new(Arc::clone(&http), config.clone());
        let cache = SnapshotCache::new(config.cache_ttl);
        Self {
            config,
            http,
            session,
            cache,
        }
    }

    /// Fetch the full-service-area snapshot.
    ///
    /// With `use_cache`, a fresh cached snapshot short-circuits the
    /// upstream fetch entirely; otherwise the upstream is always queried
    /// and the cache overwritten on success.
    pub async fn fetch_all(&self, size: usize, use_cache: bool) -> Result<OutageSnapshot> {
        let key = QueryKey::full(size);
        self.fetch_or_cached(key, None, size, use_cache).await
    }

    /// Fetch a snapshot restricted to the given bounding box. Bounded
    /// queries participate in the cache under their own keys.
    pub async fn fetch_by_bounding_box(
        &self,
        bbox: BoundingBox,
        size: usize,
    ) -> Result<OutageSnapshot> {
        let key = QueryKey::bounded(&bbox, size);
        self.fetch_or_cached(key, Some(bbox), size, true).await
    }

    /// Cached snapshot for a key, if present. The boolean is true when
    /// the entry has expired; callers that serve stale data mark it so.
    pub async fn cached_snapshot(
        &self,
        key: &QueryKey,
        allow_stale: bool,
    ) -> Option<(OutageSnapshot, bool)> {
        match self.cache.get_stale(key).await {
            Some((snap, stale)) if !stale || allow_stale => Some((snap, stale)),
            _ => None,
        }
    }

    /// Drop every cached snapshot.
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate_all().await;
        info!("snapshot cache invalidated");
    }

    /// Number of cached snapshots (fresh or expired).
    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }

    /// Probe engine health. Without a held credential this bootstraps one
    /// by loading the configuration document; with one already held the
    /// probe reports on that credential without a network round trip.
    /// Never touches the snapshot cache.
    pub async fn health_check(&self) -> HealthStatus {
        let reachable = match self.session.ensure_credential().await {
            Ok(_) => true,
            Err(e) => {
                warn!("health probe failed: {e}");
                false
            }
        };
        HealthStatus {
            reachable,
            credential_present: self.session.has_credential().await,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn fetch_or_cached(
        &self,
        key: QueryKey,
        bbox: Option<BoundingBox>,
        size: usize,
        use_cache: bool,
    ) -> Result<OutageSnapshot> {
        if use_cache {
            if let Some(snapshot) = self.cache.get(&key).await {
                return Ok(snapshot);
            }
        }

        let snapshot = self.fetch_fresh(bbox, size).await?;
        self.cache.put(key, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// One complete upstream round trip: credential, query, transform.
    ///
    /// A 401/403 on the tiles request invalidates the credential,
    /// re-bootstraps once, and retries the request once with the fresh
    /// token. A second auth failure surfaces to the caller.
    async fn fetch_fresh(&self, bbox: Option<BoundingBox>, size: usize) -> Result<OutageSnapshot> {
        let started = Instant::now();
        let payload = build_tiles_query(bbox, size);

        let credential = self.session.ensure_credential().await?;
        let resp = match self.post_tiles(&payload, credential.map(|c| c.token)).await {
            Ok(resp) => resp,
            Err(EngineError::Auth { status }) => {
                info!("tiles request rejected ({status}); refreshing session credential");
                self.session.invalidate().await;
                let credential = self.session.ensure_credential().await?;
                self.post_tiles(&payload, credential.map(|c| c.token))
                    .await?
            }
            Err(e) => return Err(e),
        };

        let raw = resp.json()?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let snapshot = pipeline::transform(&raw, elapsed_ms)?;
        debug!(
            "snapshot assembled: {} outages, {} customers, {}ms",
            snapshot.summary.total_outages,
            snapshot.summary.total_customers_affected,
            elapsed_ms,
        );
        Ok(snapshot)
    }

    async fn post_tiles(
        &self,
        payload: &serde_json::Value,
        token: Option<String>,
    ) -> Result<crate::acquisition::http_client::HttpResponse> {
        let mut headers: Vec<(String, String)> = config::tile_headers()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Some(token) = token {
            headers.push((
                "Cookie".to_string(),
                format!("{}={token}", config::SESSION_COOKIE_KEY),
            ));
        }

        self.http
            .execute(Method::POST, &self.config.tiles_url(), &headers, Some(payload))
            .await
    }
}
