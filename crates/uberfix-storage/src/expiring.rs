//! TTL cache over a [`KeyValueStore`].
//!
//! Each cached value occupies two entries: `<key>` holds the value and
//! `<key>_expiry` holds the absolute expiry in epoch milliseconds. A missing
//! or unparsable expiry is a miss. Expired entries are purged when read.
//!
//! Storage failures never surface to callers: they degrade to a miss and a
//! warning, because every caller can recover by fetching again.

use crate::KeyValueStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uberfix_config_and_utils::Clock;

/// Suffix of the companion entry holding a value's expiry.
pub const EXPIRY_SUFFIX: &str = "_expiry";

#[derive(Clone)]
pub struct ExpiringCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl ExpiringCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn expiry_key(key: &str) -> String {
        format!("{}{}", key, EXPIRY_SUFFIX)
    }

    /// Store `value` until `now + ttl`.
    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = self.clock.now_millis().saturating_add(ttl_ms);

        let result = self
            .store
            .set(key, value)
            .and_then(|_| self.store.set(&Self::expiry_key(key), &expires_at.to_string()));

        match result {
            Ok(()) => debug!(key = %key, expires_at, "cached value"),
            Err(err) => warn!(key = %key, error = %err, "failed to cache value"),
        }
    }

    /// Return the value if present and unexpired, purging it otherwise.
    pub fn get(&self, key: &str) -> Option<String> {
        let (value, expiry) = match (self.store.get(key), self.store.get(&Self::expiry_key(key))) {
            (Ok(Some(value)), Ok(Some(expiry))) => (value, expiry),
            (Ok(_), Ok(_)) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(key = %key, error = %err, "failed to read cached value");
                return None;
            }
        };

        match expiry.trim().parse::<i64>() {
            Ok(expires_at) if self.clock.now_millis() < expires_at => Some(value),
            Ok(_) => {
                debug!(key = %key, "cached value expired");
                self.clear(key);
                None
            }
            Err(_) => {
                warn!(key = %key, "unparsable expiry, discarding cached value");
                self.clear(key);
                None
            }
        }
    }

    /// Remove both entries. Never fails.
    pub fn clear(&self, key: &str) {
        for entry in [key.to_string(), Self::expiry_key(key)] {
            if let Err(err) = self.store.delete(&entry) {
                warn!(key = %entry, error = %err, "failed to clear cached entry");
            }
        }
    }

    /// Whether an expiry entry exists and lies in the future.
    ///
    /// Does not look at the value entry.
    pub fn is_valid(&self, key: &str) -> bool {
        self.expires_at(key)
            .map(|expires_at| self.clock.now_millis() < expires_at)
            .unwrap_or(false)
    }

    /// Raw expiry in epoch milliseconds, if one is stored and parses.
    pub fn expires_at(&self, key: &str) -> Option<i64> {
        match self.store.get(&Self::expiry_key(key)) {
            Ok(expiry) => expiry.and_then(|raw| raw.trim().parse::<i64>().ok()),
            Err(err) => {
                warn!(key = %key, error = %err, "failed to read cache expiry");
                None
            }
        }
    }
}

impl std::fmt::Debug for ExpiringCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
