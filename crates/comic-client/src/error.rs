//! Error types for the comic service client.

use thiserror::Error;

/// Errors that can occur when talking to the comic service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response arrived (offline, DNS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service reports that the comic does not exist.
    #[error("comic not found: {url}")]
    NotFound { url: String },

    /// Rate limited.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// Non-success status other than 404 or 429.
    #[error("request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    /// Invalid request or response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Whether retrying the same request later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::RateLimited { .. } => true,
            ClientError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the service said the comic does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}
