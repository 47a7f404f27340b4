use thiserror::Error;
use uberfix_database::DatabaseError;

/// Which limit rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Client,
    Phone,
    Verify,
}

/// Error type for OTP operations.
#[derive(Error, Debug)]
pub enum OtpError {
    /// Required input absent
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Phone number is not an Egyptian mobile number
    #[error("Invalid phone number")]
    InvalidPhone,

    /// Too many requests in the current window
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        scope: LimitScope,
        retry_after_secs: u64,
    },

    /// Record store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl OtpError {
    /// Errors caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_) | Self::InvalidPhone | Self::RateLimited { .. }
        )
    }
}

pub type OtpResult<T> = Result<T, OtpError>;
