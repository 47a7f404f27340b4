//! One-time passcodes for phone verification.
//!
//! [`OtpService::issue`] validates and rate-limits the request, stores a fresh
//! six-digit code valid for ten minutes, then tries to deliver it. Delivery is
//! best effort: a stored record is success, and the delivery outcome is
//! reported next to it. [`OtpService::verify`] redeems the newest matching
//! code at most once.

pub mod api;
mod code;
mod delivery;
mod error;
mod phone;
mod rate_limit;
mod service;
mod store;

pub use code::{generate_code, generate_code_with, CODE_MAX, CODE_MIN};
pub use delivery::{
    DeliveryChannel, DeliveryError, DeliveryStatus, LogOnlyChannel, OtpMessage, TwilioSmsChannel,
    TWILIO_API_BASE,
};
pub use error::{LimitScope, OtpError, OtpResult};
pub use phone::normalize_phone;
pub use rate_limit::{FixedWindowLimiter, RateDecision, RateLimitPolicy};
pub use service::{IssueOutcome, OtpPolicy, OtpService, VerifyOutcome, OTP_TTL_SECS};
pub use store::{MemoryOtpStore, OtpStore, SqliteOtpStore};
