//! Gateway error types.

use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport failure (DNS, connect, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("{operation} failed with status {status} ({body_summary})")]
    Status {
        operation: String,
        status: u16,
        body_summary: String,
    },

    /// 2xx response whose body was not what we expected
    #[error("Unexpected response from {operation}: {message}")]
    Decode { operation: String, message: String },

    /// Caller supplied something unusable
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failure of a query shared with other callers
    #[error(transparent)]
    Shared(Arc<GatewayError>),

    /// The query for this key ended without reporting a result
    #[error("Query for {0} ended without a result")]
    Abandoned(String),
}

impl GatewayError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Shared(inner) => inner.is_transient(),
            Self::Abandoned(_) => true,
            Self::Decode { .. } | Self::InvalidRequest(_) => false,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> GatewayError {
        GatewayError::Status {
            operation: "get-maps-key".into(),
            status: code,
            body_summary: String::new(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(403).is_transient());
        assert!(!GatewayError::InvalidRequest("empty key".into()).is_transient());
        assert!(GatewayError::Shared(Arc::new(status(502))).is_transient());
        assert!(!GatewayError::Shared(Arc::new(status(404))).is_transient());
    }
}
