//! Singleton loader for one credential-backed resource.

use crate::error::{LoadError, LoadResult};
use crate::injector::{LoadedResource, ResourceInjector, ResourceTemplate};
use crate::registry::ResourceRegistry;
use crate::source::CredentialSource;
use crate::state::{LoadMachine, LoadMachineInput, LoadMachineState, LoadStatus};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uberfix_config_and_utils::{InflightRegistry, Joined};
use uberfix_storage::{ExpiringCache, StorageKeys};

type Outcome = LoadResult<LoadedResource>;

/// What a loader loads and how long it may take.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Registry key of the loaded resource.
    pub key: String,
    /// Cache key of the credential.
    pub cache_key: String,
    pub credential_ttl: Duration,
    pub fetch_timeout: Duration,
    pub inject_timeout: Duration,
    pub template: ResourceTemplate,
}

impl LoaderConfig {
    pub fn google_maps(credential_ttl: Duration, timeout: Duration) -> Self {
        Self {
            key: "google_maps".to_string(),
            cache_key: StorageKeys::GOOGLE_MAPS_API_KEY.to_string(),
            credential_ttl,
            fetch_timeout: timeout,
            inject_timeout: timeout,
            template: ResourceTemplate::google_maps(),
        }
    }

    pub fn mapbox(credential_ttl: Duration, timeout: Duration) -> Self {
        Self {
            key: "mapbox".to_string(),
            cache_key: StorageKeys::MAPBOX_TOKEN.to_string(),
            credential_ttl,
            fetch_timeout: timeout,
            inject_timeout: timeout,
            template: ResourceTemplate::mapbox_style(),
        }
    }

    pub fn with_template(mut self, template: ResourceTemplate) -> Self {
        self.template = template;
        self
    }
}

/// Diagnostic snapshot of a loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoaderStatus {
    pub key: String,
    pub state: LoadStatus,
    pub in_flight: bool,
    pub credential_cached: bool,
    pub credential_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub disposed: bool,
}

struct LoaderState {
    machine: LoadMachine,
    /// Bumped by every reset; attempts started under an older value do not
    /// commit.
    generation: u64,
    disposed: bool,
    last_error: Option<String>,
    loaded_at: Option<DateTime<Utc>>,
}

struct Inner {
    config: LoaderConfig,
    cache: ExpiringCache,
    source: Arc<dyn CredentialSource>,
    injector: Arc<dyn ResourceInjector>,
    registry: Arc<ResourceRegistry>,
    inflight: InflightRegistry<String, Outcome>,
    state: Mutex<LoaderState>,
}

/// Loads one resource at most once at a time and shares the outcome.
///
/// Cheap to clone; clones drive the same loader.
#[derive(Clone)]
pub struct SingletonLoader {
    inner: Arc<Inner>,
}

impl SingletonLoader {
    pub fn new(
        config: LoaderConfig,
        cache: ExpiringCache,
        source: Arc<dyn CredentialSource>,
        injector: Arc<dyn ResourceInjector>,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                cache,
                source,
                injector,
                registry,
                inflight: InflightRegistry::new(),
                state: Mutex::new(LoaderState {
                    machine: LoadMachine::new(),
                    generation: 0,
                    disposed: false,
                    last_error: None,
                    loaded_at: None,
                }),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.config.key
    }

    /// Load the resource, or join the load already running.
    ///
    /// Every caller attached to one attempt gets the same outcome. Dropping
    /// the returned future does not stop the attempt.
    pub async fn load(&self) -> Outcome {
        let inner = &self.inner;
        let key = &inner.config.key;

        let waiter = {
            let mut state = inner.state.lock();
            if state.disposed {
                return Err(LoadError::Disposed);
            }

            if *state.machine.state() == LoadMachineState::Loaded {
                if let Some(resource) = inner.registry.get(key) {
                    debug!(key = %key, "Resource already loaded");
                    return Ok(resource);
                }
                warn!(key = %key, "Loaded resource vanished, loading again");
                let _ = state.machine.consume(&LoadMachineInput::ResourceVanished);
                state.loaded_at = None;
            }

            match inner.inflight.join(key) {
                Joined::Follower(waiter) => {
                    debug!(key = %key, "Joining load in flight");
                    waiter
                }
                Joined::Leader { completion, waiter } => {
                    if state.machine.consume(&LoadMachineInput::LoadRequested).is_err() {
                        // An earlier attempt ended without committing.
                        state.machine = LoadMachine::new();
                        let _ = state.machine.consume(&LoadMachineInput::LoadRequested);
                    }
                    let generation = state.generation;
                    info!(key = %key, generation, "Starting load");

                    let inner = Arc::clone(inner);
                    tokio::spawn(async move {
                        let outcome = inner.attempt(generation).await;
                        inner.commit(generation, &outcome);
                        completion.complete(outcome);
                    });
                    waiter
                }
            }
        };

        waiter.wait().await.unwrap_or(Err(LoadError::Cancelled))
    }

    /// Forget the credential and the loaded resource; the next `load` starts
    /// from scratch. Safe to call any number of times.
    pub fn reset(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            state.generation += 1;
            let _ = state.machine.consume(&LoadMachineInput::Reset);
            state.last_error = None;
            state.loaded_at = None;
        }
        inner.cache.clear(&inner.config.cache_key);
        inner.inflight.clear(&inner.config.key);
        inner.registry.remove(&inner.config.key);
        debug!(key = %inner.config.key, "Loader reset");
    }

    /// Reset and refuse further loads.
    pub fn dispose(&self) {
        self.reset();
        self.inner.state.lock().disposed = true;
        info!(key = %self.inner.config.key, "Loader disposed");
    }

    /// Loaded, and the resource is still present.
    pub fn is_loaded(&self) -> bool {
        let loaded = *self.inner.state.lock().machine.state() == LoadMachineState::Loaded;
        loaded && self.inner.registry.contains(&self.inner.config.key)
    }

    pub fn status(&self) -> LoaderStatus {
        let inner = &self.inner;
        let (state, last_error, loaded_at, disposed) = {
            let state = inner.state.lock();
            (
                LoadStatus::from(state.machine.state()),
                state.last_error.clone(),
                state.loaded_at,
                state.disposed,
            )
        };

        LoaderStatus {
            key: inner.config.key.clone(),
            state,
            in_flight: inner.inflight.contains(&inner.config.key),
            credential_cached: inner.cache.is_valid(&inner.config.cache_key),
            credential_expires_at: inner
                .cache
                .expires_at(&inner.config.cache_key)
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            last_error,
            loaded_at,
            disposed,
        }
    }
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.generation == generation && !state.disposed
    }

    async fn credential(&self, generation: u64) -> LoadResult<String> {
        if let Some(credential) = self.cache.get(&self.config.cache_key) {
            debug!(key = %self.config.key, "Using cached credential");
            return Ok(credential);
        }

        let timeout = self.config.fetch_timeout;
        let credential = match tokio::time::timeout(timeout, self.source.fetch()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(LoadError::Timeout {
                    stage: "credential fetch".to_string(),
                    after_ms: timeout.as_millis() as u64,
                })
            }
        };
        debug!(key = %self.config.key, source = %self.source.name(), "Fetched credential");

        if self.is_current(generation) {
            self.cache
                .set(&self.config.cache_key, &credential, self.config.credential_ttl);
        }
        Ok(credential)
    }

    async fn attempt(&self, generation: u64) -> Outcome {
        let credential = self.credential(generation).await?;

        let timeout = self.config.inject_timeout;
        let result = match tokio::time::timeout(
            timeout,
            self.injector.inject(&credential, &self.config.template),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LoadError::Timeout {
                stage: "resource injection".to_string(),
                after_ms: timeout.as_millis() as u64,
            }),
        };

        if result.is_err() && self.is_current(generation) {
            // The cached credential may be the reason; fetch a fresh one next time.
            self.cache.clear(&self.config.cache_key);
        }
        result
    }

    fn commit(&self, generation: u64, outcome: &Outcome) {
        let key = &self.config.key;
        let mut state = self.state.lock();
        if state.generation != generation || state.disposed {
            debug!(key = %key, generation, "Discarding outcome of a reset load");
            return;
        }

        match outcome {
            Ok(resource) => {
                self.registry.publish(key, resource.clone());
                let _ = state.machine.consume(&LoadMachineInput::LoadSucceeded);
                state.last_error = None;
                state.loaded_at = Some(resource.loaded_at);
                info!(key = %key, "Resource loaded");
            }
            Err(err) => {
                let _ = state.machine.consume(&LoadMachineInput::LoadFailed);
                state.last_error = Some(err.to_string());
                warn!(key = %key, error = %err, transient = err.is_transient(), "Resource load failed");
            }
        }
    }
}
