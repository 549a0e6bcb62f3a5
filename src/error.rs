//! Error taxonomy for the acquisition engine.
//!
//! Classification drives retry behavior: [`EngineError::RateLimited`] and
//! transport failures are retried with backoff inside the HTTP client,
//! auth failures trigger a session re-bootstrap in the service layer, and
//! everything else surfaces to the caller unretried.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while acquiring or normalizing outage data.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Upstream rejected the session credential (401/403). Not retried
    /// blindly — the caller invalidates the credential and re-bootstraps.
    #[error("authentication rejected by upstream (HTTP {status})")]
    Auth { status: u16 },

    /// Upstream is rate limiting or temporarily unavailable (429/503).
    /// Retried with bounded backoff.
    #[error("rate limited by upstream (HTTP {status})")]
    RateLimited { status: u16 },

    /// All retry attempts exhausted on a transient failure.
    #[error("upstream request failed after {attempts} attempts: {cause}")]
    Network { attempts: u32, cause: String },

    /// The top-level response shape was not what the search backend
    /// contract promises. Not retried.
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Any other non-success HTTP status. Not retried.
    #[error("upstream returned HTTP {status}")]
    Http { status: u16 },
}

impl EngineError {
    pub fn auth(status: u16) -> Self {
        EngineError::Auth { status }
    }

    pub fn rate_limited(status: u16) -> Self {
        EngineError::RateLimited { status }
    }

    pub fn network(attempts: u32, cause: impl Into<String>) -> Self {
        EngineError::Network {
            attempts,
            cause: cause.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        EngineError::MalformedResponse(msg.into())
    }

    pub fn http(status: u16) -> Self {
        EngineError::Http { status }
    }

    /// Whether the HTTP client may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::RateLimited { .. })
    }
}
