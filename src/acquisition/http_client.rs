//! Resilient async HTTP client wrapping reqwest.
//!
//! Every attempt is preceded by a jittered pacing delay so the engine
//! never hammers the upstream service, including on retries. The retry
//! loop is an explicit state machine rather than nested control flow,
//! which keeps timeout composition testable: the only suspension points
//! are the reqwest call and the `tokio::time::sleep`s, so an outer
//! `tokio::time::timeout` cancels the whole request cleanly.

use rand::Rng;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Total attempts per request (initial + retries).
pub const MAX_ATTEMPTS: u32 = 3;

/// Upper bound of the uniform jitter added to the pacing delay.
const PACING_JITTER_MS: u64 = 500;

/// Response from an upstream request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// All response headers. Auth callers need `set-cookie`, so nothing
    /// is filtered out here.
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// Parse the body as JSON.
    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| EngineError::malformed(format!("response body is not JSON: {e}")))
    }
}

/// Outcome of a single send attempt.
enum Attempt {
    Ok(HttpResponse),
    /// Connect failure, timeout, or 429/503 — eligible for retry.
    Transient(String),
    /// Surfaced to the caller immediately, never retried.
    Fatal(EngineError),
}

/// Retry loop state. One request walks Attempting → (BackingOff →
/// Attempting)* → Succeeded | Exhausted.
enum RetryState {
    Attempting {
        attempt: u32,
    },
    BackingOff {
        next_attempt: u32,
        delay: Duration,
        cause: String,
    },
    Succeeded(HttpResponse),
    Exhausted {
        attempts: u32,
        cause: String,
    },
}

/// Paced, retrying HTTP executor for the acquisition engine.
#[derive(Clone)]
pub struct ResilientHttpClient {
    client: reqwest::Client,
    pacing: Duration,
}

impl ResilientHttpClient {
    /// Create a client with the given pacing delay and per-request timeout.
    pub fn new(pacing: Duration, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();

        Self { client, pacing }
    }

    /// Execute a request with pacing, bounded retries, and backoff.
    ///
    /// Retries on connect failure, timeout, 429, and 503. 401/403 surface
    /// immediately as [`EngineError::Auth`]; any other non-success status
    /// surfaces as [`EngineError::Http`]. Exhausting all attempts yields
    /// [`EngineError::Network`] with the attempt count and last cause.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let mut state = RetryState::Attempting { attempt: 0 };

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    self.pace().await;
                    match self.send_once(method.clone(), url, headers, body).await {
                        Attempt::Ok(resp) => RetryState::Succeeded(resp),
                        Attempt::Transient(cause) if attempt + 1 < MAX_ATTEMPTS => {
                            RetryState::BackingOff {
                                next_attempt: attempt + 1,
                                delay: backoff_delay(attempt),
                                cause,
                            }
                        }
                        Attempt::Transient(cause) => RetryState::Exhausted {
                            attempts: MAX_ATTEMPTS,
                            cause,
                        },
                        Attempt::Fatal(err) => return Err(err),
                    }
                }
                RetryState::BackingOff {
                    next_attempt,
                    delay,
                    cause,
                } => {
                    debug!(
                        "retrying in {:.1}s (attempt {}/{MAX_ATTEMPTS}): {cause}",
                        delay.as_secs_f64(),
                        next_attempt + 1,
                    );
                    tokio::time::sleep(delay).await;
                    RetryState::Attempting {
                        attempt: next_attempt,
                    }
                }
                RetryState::Succeeded(resp) => return Ok(resp),
                RetryState::Exhausted { attempts, cause } => {
                    warn!("request to {url} failed after {attempts} attempts: {cause}");
                    return Err(EngineError::network(attempts, cause));
                }
            };
        }
    }

    /// One send, classified into the retry taxonomy.
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<&Value>,
    ) -> Attempt {
        let mut builder = self.client.request(method, url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(json) = body {
            builder = builder.json(json);
        }

        let resp = match builder.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Attempt::Transient("request timeout".into()),
            Err(e) if e.is_connect() => {
                return Attempt::Transient(format!("connection failure: {e}"))
            }
            Err(e) => return Attempt::Transient(e.to_string()),
        };

        let status = resp.status().as_u16();
        match status {
            200..=299 => {
                let headers: Vec<(String, String)> = resp
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                    .collect();
                let body = resp.text().await.unwrap_or_default();
                Attempt::Ok(HttpResponse {
                    status,
                    headers,
                    body,
                })
            }
            401 | 403 => Attempt::Fatal(EngineError::auth(status)),
            429 | 503 => Attempt::Transient(EngineError::rate_limited(status).to_string()),
            _ => Attempt::Fatal(EngineError::http(status)),
        }
    }

    /// Jittered pacing delay, applied before every attempt.
    async fn pace(&self) {
        if self.pacing.is_zero() {
            return;
        }
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=PACING_JITTER_MS));
        tokio::time::sleep(self.pacing + jitter).await;
    }
}

/// Backoff between retries: `2^attempt + random(0,1)` seconds.
fn backoff_delay(attempt: u32) -> Duration {
    let base = 2u64.pow(attempt) as f64;
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    Duration::from_secs_f64(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_bounds() {
        // attempt 0 → [1, 2), attempt 1 → [2, 3), attempt 2 → [4, 5)
        for (attempt, base) in [(0u32, 1.0f64), (1, 2.0), (2, 4.0)] {
            let d = backoff_delay(attempt).as_secs_f64();
            assert!(d >= base && d < base + 1.0, "attempt {attempt}: {d}");
        }
    }

    #[test]
    fn test_response_json_parse() {
        let resp = HttpResponse {
            status: 200,
            headers: vec![],
            body: r#"{"hits":{"hits":[]}}"#.to_string(),
        };
        assert!(resp.json().is_ok());

        let bad = HttpResponse {
            status: 200,
            headers: vec![],
            body: "<html>not json</html>".to_string(),
        };
        assert!(matches!(
            bad.json(),
            Err(EngineError::MalformedResponse(_))
        ));
    }
}
