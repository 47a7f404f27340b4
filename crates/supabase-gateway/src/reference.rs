//! TTL cache for reference tables.
//!
//! Keys look like `table` or `table:arg` (`districts:<city_id>`). The table
//! part picks both the TTL and the query run on a miss. Expiry is lazy.

use crate::client::SupabaseClient;
use crate::error::{GatewayError, GatewayResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uberfix_config_and_utils::{Clock, InflightRegistry, Joined};

/// TTL for tables without an entry in [`reference_ttl`].
pub const DEFAULT_REFERENCE_TTL_SECS: u64 = 900;

/// TTL used by [`ReferenceDataCache::set`] when none is given.
pub const DEFAULT_SET_TTL_SECS: u64 = 300;

/// TTL for a reference table.
pub fn reference_ttl(table: &str) -> Duration {
    let secs = match table {
        "categories" | "services" => 3_600,
        "cities" | "districts" => 86_400,
        "profiles" => 900,
        "api_responses" => 300,
        "technicians" => 1_800,
        "properties" => 600,
        "maintenance_requests" => 120,
        _ => DEFAULT_REFERENCE_TTL_SECS,
    };
    Duration::from_secs(secs)
}

/// PostgREST parameters used to load a table, or `None` when the table has
/// no loader and only holds values stored with `set`.
fn reference_query(table: &str, arg: Option<&str>) -> GatewayResult<Option<Vec<(&'static str, String)>>> {
    let query = match table {
        "categories" | "services" => vec![
            ("select", "*".to_string()),
            ("is_active", "eq.true".to_string()),
            ("order", "sort_order".to_string()),
        ],
        "cities" => vec![("select", "*".to_string()), ("order", "name_ar".to_string())],
        "districts" => {
            let city_id = arg.filter(|id| !id.is_empty()).ok_or_else(|| {
                GatewayError::InvalidRequest("districts key needs a city id".to_string())
            })?;
            vec![
                ("select", "*".to_string()),
                ("city_id", format!("eq.{}", city_id)),
                ("order", "name_ar".to_string()),
            ]
        }
        "technicians" => vec![
            (
                "select",
                "id,full_name,specialization,rating,city_id,district_id,is_available".to_string(),
            ),
            ("status", "eq.active".to_string()),
            ("order", "rating.desc".to_string()),
            ("limit", "50".to_string()),
        ],
        "properties" => vec![
            (
                "select",
                "id,name,address,city_id,district_id,type,status".to_string(),
            ),
            ("order", "created_at.desc".to_string()),
            ("limit", "100".to_string()),
        ],
        _ => return Ok(None),
    };
    Ok(Some(query))
}

#[derive(Debug, Clone)]
struct Entry {
    data: Value,
    expires_at_ms: i64,
}

type Entries = Arc<RwLock<HashMap<String, Entry>>>;

/// Outcome of one table query, shared by every caller that waited on it.
type SharedRows = Result<Value, Arc<GatewayError>>;

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceData {
    pub data: Value,
    /// True when this caller did not run the database query itself.
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

pub struct ReferenceDataCache {
    client: SupabaseClient,
    clock: Arc<dyn Clock>,
    query_timeout: Duration,
    entries: Entries,
    inflight: InflightRegistry<String, SharedRows>,
}

fn expiry_after(clock: &dyn Clock, ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    clock.now_millis().saturating_add(ttl_ms)
}

/// Store `entry`, dropping whatever has expired on the way.
async fn store(entries: &Entries, now_ms: i64, key: String, entry: Entry) -> usize {
    let mut entries = entries.write().await;
    let before = entries.len();
    entries.retain(|_, cached| cached.expires_at_ms > now_ms);
    let evicted = before - entries.len();
    entries.insert(key, entry);
    evicted
}

impl ReferenceDataCache {
    pub fn new(client: SupabaseClient, clock: Arc<dyn Clock>, query_timeout: Duration) -> Self {
        Self {
            client,
            clock,
            query_timeout,
            entries: Arc::new(RwLock::new(HashMap::new())),
            inflight: InflightRegistry::new(),
        }
    }

    /// Serve `key` from cache, or query its table and cache the rows.
    ///
    /// Concurrent misses for one key share a single query. Keys whose table
    /// has no query are answered with `null` and never stored.
    pub async fn get(&self, key: &str) -> GatewayResult<ReferenceData> {
        if key.is_empty() {
            return Err(GatewayError::InvalidRequest("missing key".to_string()));
        }

        let now = self.clock.now_millis();
        if let Some(entry) = self.entries.read().await.get(key) {
            if entry.expires_at_ms > now {
                tracing::debug!(key = %key, "Reference cache hit");
                return Ok(ReferenceData {
                    data: entry.data.clone(),
                    cached: true,
                });
            }
        }

        let (table, arg) = match key.split_once(':') {
            Some((table, arg)) => (table, Some(arg)),
            None => (key, None),
        };

        let Some(query) = reference_query(table, arg)? else {
            tracing::debug!(key = %key, "No query for reference table");
            return Ok(ReferenceData {
                data: Value::Null,
                cached: false,
            });
        };

        let key = key.to_string();
        let (waiter, leader) = match self.inflight.join(&key) {
            Joined::Follower(waiter) => (waiter, false),
            Joined::Leader { completion, waiter } => {
                let client = self.client.clone();
                let clock = Arc::clone(&self.clock);
                let entries = Arc::clone(&self.entries);
                let timeout = self.query_timeout;
                let table = table.to_string();
                let key = key.clone();
                // Detached so a caller going away does not strand the others.
                tokio::spawn(async move {
                    let rows = client.select(&table, &query, timeout).await;
                    if let Ok(data) = &rows {
                        let ttl = reference_ttl(&table);
                        let entry = Entry {
                            data: data.clone(),
                            expires_at_ms: expiry_after(clock.as_ref(), ttl),
                        };
                        let evicted = store(&entries, clock.now_millis(), key.clone(), entry).await;
                        tracing::debug!(
                            key = %key,
                            ttl_secs = ttl.as_secs(),
                            evicted,
                            "Reference cache miss, stored"
                        );
                    }
                    completion.complete(rows.map_err(Arc::new));
                });
                (waiter, true)
            }
        };

        match waiter.wait().await {
            Some(Ok(data)) => Ok(ReferenceData {
                data,
                cached: !leader,
            }),
            Some(Err(err)) => Err(GatewayError::Shared(err)),
            None => Err(GatewayError::Abandoned(key)),
        }
    }

    /// Store `data` under `key` for `ttl` (default five minutes).
    pub async fn set(&self, key: &str, data: Value, ttl: Option<Duration>) -> GatewayResult<()> {
        if key.is_empty() {
            return Err(GatewayError::InvalidRequest("missing key".to_string()));
        }
        let ttl = ttl.unwrap_or(Duration::from_secs(DEFAULT_SET_TTL_SECS));
        let entry = Entry {
            data,
            expires_at_ms: expiry_after(self.clock.as_ref(), ttl),
        };
        store(&self.entries, self.clock.now_millis(), key.to_string(), entry).await;
        Ok(())
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn prune_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at_ms > now);
        before - entries.len()
    }

    /// Drop everything (`None`), one key, or every key sharing the prefix
    /// before a trailing `*`. Returns how many entries were removed.
    pub async fn invalidate(&self, key: Option<&str>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        match key {
            None => entries.clear(),
            Some(pattern) => match pattern.strip_suffix('*') {
                Some(prefix) => entries.retain(|cached, _| !cached.starts_with(prefix)),
                None => {
                    entries.remove(pattern);
                }
            },
        }
        let removed = before - entries.len();
        tracing::info!(pattern = ?key, removed, "Reference cache invalidated");
        removed
    }

    /// Live entry count and keys, sorted.
    pub async fn stats(&self) -> CacheStats {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at_ms > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }
}
