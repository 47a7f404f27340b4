//! Loader error types.

use supabase_gateway::GatewayError;
use thiserror::Error;

/// Failure of one load attempt.
///
/// Cloneable because every waiter attached to an attempt receives the same
/// error value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Missing or unusable configuration; retrying will not help
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The credential endpoint failed
    #[error("Credential fetch failed: {message}")]
    Fetch { message: String, transient: bool },

    /// The resource endpoint rejected the request
    #[error("Resource injection failed: {message}")]
    Injection {
        status: Option<u16>,
        message: String,
    },

    /// A stage ran past its deadline
    #[error("{stage} timed out after {after_ms} ms")]
    Timeout { stage: String, after_ms: u64 },

    /// The attempt ended without producing an outcome
    #[error("Load cancelled")]
    Cancelled,

    /// The loader was disposed
    #[error("Loader disposed")]
    Disposed,
}

impl LoadError {
    /// Whether a later `load()` may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { transient, .. } => *transient,
            Self::Injection { status, .. } => match status {
                Some(code) => *code == 429 || *code >= 500,
                None => true,
            },
            Self::Timeout { .. } | Self::Cancelled => true,
            Self::Configuration(_) | Self::Disposed => false,
        }
    }
}

impl From<GatewayError> for LoadError {
    fn from(err: GatewayError) -> Self {
        Self::Fetch {
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
