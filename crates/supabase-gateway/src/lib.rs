//! Supabase access for UberFix: edge-function calls, table reads, and an
//! in-memory TTL cache for slow-changing reference tables.

mod client;
mod error;
mod reference;

pub use client::{SupabaseClient, DEFAULT_APP_ORIGIN};
pub use error::{GatewayError, GatewayResult};
pub use reference::{
    reference_ttl, CacheStats, ReferenceData, ReferenceDataCache, DEFAULT_REFERENCE_TTL_SECS,
    DEFAULT_SET_TTL_SECS,
};
