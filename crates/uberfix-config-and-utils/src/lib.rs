//! Configuration, paths, time and shared utilities for UberFix services.

mod clock;
mod config;
mod deadline;
mod error;
mod inflight;
mod logging;
mod paths;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    Config, TwilioConfig, DEFAULT_CREDENTIAL_TTL_SECS, DEFAULT_DELIVERY_TIMEOUT_MS,
    DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_GOOGLE_MAPS_FUNCTION, DEFAULT_LOG_LEVEL,
    DEFAULT_MAPBOX_FUNCTION, DEFAULT_SUPABASE_ANON_KEY, DEFAULT_SUPABASE_URL,
};
pub use deadline::with_deadline;
pub use error::{CoreError, CoreResult};
pub use inflight::{Completion, InflightRegistry, Joined, Waiter};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
