use reqwest::StatusCode;
use thiserror::Error;

/// Failure kinds surfaced by the gateway. Callers match on the kind to pick
/// a user-visible status; only `Network` is ever retried.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Upstream rejected our credentials (401/403). Retrying with the same
    /// key cannot succeed, so this is fatal to the whole operation.
    #[error("authentication failed against {upstream}")]
    Authentication { upstream: &'static str },

    /// The requested identifier does not exist upstream.
    #[error("{upstream}: not found")]
    NotFound { upstream: &'static str },

    /// Transient I/O or HTTP failure, eligible for backoff and retry.
    #[error("{upstream}: network request failed: {message}")]
    Network {
        upstream: &'static str,
        message: String,
    },

    /// Caller-supplied input was malformed; rejected before any upstream
    /// call is made.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl GatewayError {
    pub fn network(upstream: &'static str, err: impl std::fmt::Display) -> Self {
        GatewayError::Network {
            upstream,
            message: err.to_string(),
        }
    }

    /// Whether the backoff executor may try this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Network { .. })
    }

    /// Classify an unexpected upstream HTTP status.
    pub fn from_status(upstream: &'static str, status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                GatewayError::Authentication { upstream }
            }
            StatusCode::NOT_FOUND => GatewayError::NotFound { upstream },
            _ => GatewayError::Network {
                upstream,
                message: format!("unexpected status {status}"),
            },
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        // Transport-level failures carry no upstream verdict, so they are
        // transient by classification.
        GatewayError::Network {
            upstream: "http",
            message: err.to_string(),
        }
    }
}
