//! Error types for the client library.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::auth::AuthError;

/// Error response body from the completion API.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// The error detail object from the API.
    pub error: ErrorDetail,
}

/// Detailed error information from the completion API.
#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    /// The error message text.
    pub message: String,
}

/// Errors that can occur when talking to the identity endpoint or the
/// completion API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network or HTTP transport failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Middleware layer error (retry/backoff plumbing).
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// JSON encoding or decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Token acquisition failed at the identity endpoint.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The gateway rejected the bearer token (HTTP 401/403).
    ///
    /// The model adapter answers this with exactly one token reset and one
    /// retry of the original request.
    #[error("Gateway rejected credentials ({status}): {message}")]
    AuthRejected {
        /// The rejecting status code.
        status: u16,
        /// The error message the gateway returned.
        message: String,
    },

    /// SSE event source error.
    #[error("EventSource error: {0}")]
    EventSource(#[from] reqwest_eventsource::Error),

    /// Rate limit exceeded (HTTP 429). Surfaced unmodified; not retried.
    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimit {
        /// Wait time suggested by the API, if any.
        retry_after: Option<Duration>,
    },

    /// The completion API itself failed for reasons unrelated to auth.
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// The HTTP status the API returned.
        status: u16,
        /// The error message the API returned.
        message: String,
    },

    /// Client configuration issue (bad URL, missing key).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected or malformed API response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Whether this error is potentially retryable by a transient-retry
    /// policy: transport failures, rate limits, and 5xx responses.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Middleware(_)
                | Self::RateLimit { .. }
                | Self::Upstream { status: 500..=599, .. }
        )
    }

    /// Whether the gateway rejected the bearer token.
    ///
    /// Only these errors are answered by the single reset-and-retry.
    #[must_use]
    pub const fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }

    /// The suggested wait time when rate limited.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_auth_rejection_detection() {
        let rejected = ClientError::AuthRejected {
            status: 401,
            message: "expired".to_string(),
        };
        assert!(rejected.is_auth_rejection());
        assert!(!rejected.is_retryable());

        let rate_limited = ClientError::RateLimit { retry_after: None };
        assert!(!rate_limited.is_auth_rejection());
        assert!(rate_limited.is_retryable());
    }

    #[test]
    fn test_upstream_retryability_by_status() {
        let server = ClientError::Upstream {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(server.is_retryable());

        let client = ClientError::Upstream {
            status: 400,
            message: "bad request".to_string(),
        };
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_retry_after_extraction() {
        let err = ClientError::RateLimit {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(
            ClientError::InvalidRequest("x".to_string()).retry_after(),
            None
        );
    }
}
