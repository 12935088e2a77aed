//! Failure taxonomy for the sync layer.
//!
//! Every remote rejection funnels into `SyncError` so the cache layer can
//! treat rollback uniformly while still letting the UI distinguish a dead
//! network from a domain rejection (e.g. a duplicate judge name).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote call never completed (connection refused, DNS, timeout).
    #[error("network failure: {0}")]
    Network(String),

    /// The server processed the request and rejected it, with a
    /// human-readable reason taken from the response body.
    #[error("{0}")]
    Validation(String),

    #[error("unauthorized - token may be expired")]
    Unauthorized,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("rate limited - please wait before retrying")]
    RateLimited,

    #[error("server error: {0}")]
    Server(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Internal misuse of the mutation protocol, e.g. a rollback attempted
    /// without a captured snapshot. Should never occur in correct usage.
    #[error("invariant violation: {0}")]
    Invariant(&'static str),
}

/// Maximum length for error response bodies carried in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Shape of an error body from the scoring API. Only the message matters.
#[derive(serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl SyncError {
    /// Truncate a response body to avoid dragging huge payloads into logs.
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    /// Pull the human-readable message field out of an error body, falling
    /// back to the raw (truncated) body when it is not JSON.
    fn body_message(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { message: Some(m) }) if !m.is_empty() => m,
            _ => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 | 409 | 422 => SyncError::Validation(Self::body_message(body)),
            401 | 403 => SyncError::Unauthorized,
            404 => SyncError::NotFound(Self::truncate_body(body)),
            429 => SyncError::RateLimited,
            500..=599 => SyncError::Server(Self::truncate_body(body)),
            _ => SyncError::InvalidResponse(format!(
                "Status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }

    /// Whether the server rejected the request at the domain level rather
    /// than the request failing in transit.
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}
