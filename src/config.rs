//! Engine configuration and upstream wire-contract constants.
//!
//! The URLs, header values, cookie key, and field names below are part of
//! the upstream service's contract — they mirror what the outage map's own
//! browser client sends and must be preserved literally for interop.
//! Operational knobs (pacing, TTL, port) are overridable via `GRIDWATCH_*`
//! environment variables.

use std::time::Duration;

/// Production base URL of the upstream outage-data service.
pub const DEFAULT_BASE_URL: &str = "https://outage-data-prod-hrcadje2h9aje9c9.a03.azurefd.net";

/// Path of the remote configuration document (GET).
pub const CONFIG_PATH: &str = "/api/v1/config";

/// Path of the geo-search tiles endpoint (POST JSON).
pub const TILES_PATH: &str = "/api/v1/outage-tiles";

/// Cookie key under which the upstream hands out the session token.
pub const SESSION_COOKIE_KEY: &str = "MIC-X-API-V2";

/// Default result-set cap for tile queries.
pub const DEFAULT_QUERY_SIZE: usize = 10_000;

/// Default full-service-area bounding box (top-left / bottom-right).
/// These exact coordinates are what the upstream map client requests
/// when showing the whole service territory.
pub const DEFAULT_BBOX_NORTH: f64 = 28.703_433_072_409_43;
pub const DEFAULT_BBOX_WEST: f64 = -84.701_027_309_765_62;
pub const DEFAULT_BBOX_SOUTH: f64 = 27.003_667_078_761_065;
pub const DEFAULT_BBOX_EAST: f64 = -79.996_132_290_234_37;

/// Browser-mimicking headers sent on every upstream request.
pub fn browser_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Origin", "https://outage.tecoenergy.com"),
        ("Referer", "https://outage.tecoenergy.com/"),
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
    ]
}

/// Additional headers for tile (search) requests.
pub fn tile_headers() -> Vec<(&'static str, &'static str)> {
    let mut headers = browser_headers();
    headers.retain(|(k, _)| *k != "Accept");
    headers.push(("Content-Type", "application/json"));
    headers.push(("Accept", "*/*"));
    headers
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the upstream service.
    pub base_url: String,
    /// Minimum pacing delay applied before every upstream attempt.
    pub rate_limit_delay: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Snapshot cache TTL.
    pub cache_ttl: Duration,
    /// Port for the REST boundary layer.
    pub http_port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limit_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(300),
            http_port: 7800,
        }
    }
}

impl EngineConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Recognized variables: `GRIDWATCH_BASE_URL`, `GRIDWATCH_RATE_LIMIT_MS`,
    /// `GRIDWATCH_REQUEST_TIMEOUT_S`, `GRIDWATCH_CACHE_TTL_S`,
    /// `GRIDWATCH_HTTP_PORT`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(url) = std::env::var("GRIDWATCH_BASE_URL") {
            cfg.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ms) = env_u64("GRIDWATCH_RATE_LIMIT_MS") {
            cfg.rate_limit_delay = Duration::from_millis(ms);
        }
        if let Some(s) = env_u64("GRIDWATCH_REQUEST_TIMEOUT_S") {
            cfg.request_timeout = Duration::from_secs(s);
        }
        if let Some(s) = env_u64("GRIDWATCH_CACHE_TTL_S") {
            cfg.cache_ttl = Duration::from_secs(s);
        }
        if let Some(p) = env_u64("GRIDWATCH_HTTP_PORT") {
            cfg.http_port = p as u16;
        }

        cfg
    }

    /// Full URL of the remote configuration document.
    pub fn config_url(&self) -> String {
        format!("{}{}", self.base_url, CONFIG_PATH)
    }

    /// Full URL of the tiles search endpoint.
    pub fn tiles_url(&self) -> String {
        format!("{}{}", self.base_url, TILES_PATH)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
