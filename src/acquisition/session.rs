//! Session credential lifecycle.
//!
//! The upstream hands out a session token as a `set-cookie` header on the
//! configuration document response. The token has no server-declared TTL;
//! it is treated as valid until a request using it comes back 401/403, at
//! which point the caller invalidates it here and the next
//! `ensure_credential` re-bootstraps with a fresh config load.

use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::acquisition::http_client::ResilientHttpClient;
use crate::config::{self, EngineConfig};
use crate::error::Result;
use crate::model::SessionCredential;

/// Holds the process-lifetime session credential and the parsed remote
/// configuration document. Safe under concurrent callers: readers see
/// either the previous credential or the new one, never a partial write.
pub struct SessionManager {
    http: Arc<ResilientHttpClient>,
    config: EngineConfig,
    credential: RwLock<Option<SessionCredential>>,
    remote_config: RwLock<Option<Value>>,
}

impl SessionManager {
    pub fn new(http: Arc<ResilientHttpClient>, config: EngineConfig) -> Self {
        Self {
            http,
            config,
            credential: RwLock::new(None),
            remote_config: RwLock::new(None),
        }
    }

    /// Return the current credential, bootstrapping from the remote config
    /// document on first use (or after invalidation).
    ///
    /// Returns `None` when the config response carried no session cookie —
    /// downstream requests then proceed unauthenticated and may fail.
    pub async fn ensure_credential(&self) -> Result<Option<SessionCredential>> {
        if let Some(cred) = self.credential.read().await.clone() {
            return Ok(Some(cred));
        }
        self.bootstrap().await
    }

    /// Discard the current credential. Called when a request using it
    /// came back 401/403.
    pub async fn invalidate(&self) {
        let mut cred = self.credential.write().await;
        if cred.take().is_some() {
            info!("session credential invalidated; will re-bootstrap on next request");
        }
    }

    /// Whether a credential is currently held (no network).
    pub async fn has_credential(&self) -> bool {
        self.credential.read().await.is_some()
    }

    /// The parsed remote configuration document, if loaded.
    pub async fn remote_config(&self) -> Option<Value> {
        self.remote_config.read().await.clone()
    }

    /// Fetch the remote config document and extract a fresh credential
    /// from its `set-cookie` headers.
    async fn bootstrap(&self) -> Result<Option<SessionCredential>> {
        let headers: Vec<(String, String)> = config::browser_headers()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let resp = self
            .http
            .execute(Method::GET, &self.config.config_url(), &headers, None)
            .await?;

        match resp.json() {
            Ok(doc) => {
                debug!(
                    "remote config loaded (index: {})",
                    doc.get("index").and_then(|v| v.as_str()).unwrap_or("n/a")
                );
                *self.remote_config.write().await = Some(doc);
            }
            Err(e) => warn!("config document did not parse as JSON: {e}"),
        }

        let credential = extract_session_cookie(&resp.headers).map(SessionCredential::new);
        match &credential {
            Some(cred) => info!(
                "extracted fresh session credential ({} chars)",
                cred.token.len()
            ),
            None => warn!("config response carried no session cookie; requests will be unauthenticated"),
        }

        *self.credential.write().await = credential.clone();
        Ok(credential)
    }
}

/// Pull the session token out of `set-cookie` response headers.
///
/// The upstream may fold multiple cookies into one comma-separated header
/// value, so each header is split on commas before looking for the key.
fn extract_session_cookie(headers: &[(String, String)]) -> Option<String> {
    let prefix = format!("{}=", config::SESSION_COOKIE_KEY);
    for (name, value) in headers {
        if !name.eq_ignore_ascii_case("set-cookie") {
            continue;
        }
        for part in value.split(',') {
            if let Some(rest) = part.find(&prefix).map(|i| &part[i + prefix.len()..]) {
                let token = rest.split(';').next().unwrap_or("").trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    None
}
