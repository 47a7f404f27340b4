//! Composition root: every long-lived service, built once from config.

use clap::ValueEnum;
use otp_engine::{
    DeliveryChannel, LogOnlyChannel, OtpPolicy, OtpService, SqliteOtpStore, TwilioSmsChannel,
};
use resource_loader::{
    CredentialSource, EdgeFunctionSource, EnvSource, HttpResourceInjector, LoaderConfig,
    ResourceRegistry, SingletonLoader,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use supabase_gateway::{ReferenceDataCache, SupabaseClient, DEFAULT_APP_ORIGIN};
use uberfix_config_and_utils::{Clock, Config, Paths, SystemClock};
use uberfix_database::AsyncDatabase;
use uberfix_storage::{ExpiringCache, FileStore};

/// Local override for the Mapbox token, checked before the edge function.
pub const MAPBOX_TOKEN_ENV: &str = "MAPBOX_TOKEN";

/// Map provider with a credential-backed loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    GoogleMaps,
    Mapbox,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    #[allow(dead_code)]
    pub config: Arc<Config>,
    pub paths: Arc<Paths>,
    /// Async database executor with dedicated SQLite thread.
    pub db: AsyncDatabase,
    pub otp: Arc<OtpService>,
    pub google_maps: SingletonLoader,
    pub mapbox: SingletonLoader,
    /// Reference tables read through Supabase REST.
    pub reference: Arc<ReferenceDataCache>,
}

impl AppState {
    pub async fn build(config: Config, paths: Paths) -> Result<Self, Box<dyn std::error::Error>> {
        Self::build_with_clock(config, paths, Arc::new(SystemClock)).await
    }

    pub async fn build_with_clock(
        config: Config,
        paths: Paths,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        paths.ensure_dirs()?;
        let http_client = reqwest::Client::new();

        let db = AsyncDatabase::open(&paths.database_file()).await?;

        let channel: Arc<dyn DeliveryChannel> = match &config.twilio {
            Some(twilio) => Arc::new(TwilioSmsChannel::with_http_client(http_client.clone(), twilio)),
            None => Arc::new(LogOnlyChannel),
        };
        let otp = Arc::new(OtpService::new(
            Arc::new(SqliteOtpStore::new(db.clone())),
            channel,
            clock.clone(),
            OtpPolicy {
                delivery_timeout: config.delivery_timeout(),
                ..OtpPolicy::default()
            },
        ));

        let supabase = SupabaseClient::with_http_client(
            http_client.clone(),
            &config.supabase_url,
            &config.supabase_anon_key,
        )
        .with_origin(DEFAULT_APP_ORIGIN);

        let cache = ExpiringCache::new(Arc::new(FileStore::new(paths.storage_file())?), clock.clone());
        let registry = Arc::new(ResourceRegistry::new());
        let injector = Arc::new(HttpResourceInjector::with_http_client(
            http_client,
            config.fetch_timeout(),
        ));

        let google_maps = SingletonLoader::new(
            LoaderConfig::google_maps(config.credential_ttl(), config.fetch_timeout()),
            cache.clone(),
            Arc::new(EdgeFunctionSource::google_maps(
                supabase.clone(),
                &config.google_maps_function,
                config.fetch_timeout(),
            )),
            injector.clone(),
            registry.clone(),
        );

        let mapbox_source: Arc<dyn CredentialSource> = if std::env::var_os(MAPBOX_TOKEN_ENV).is_some() {
            Arc::new(EnvSource::new(MAPBOX_TOKEN_ENV))
        } else {
            Arc::new(EdgeFunctionSource::mapbox(
                supabase.clone(),
                &config.mapbox_function,
                config.fetch_timeout(),
            ))
        };
        let mapbox = SingletonLoader::new(
            LoaderConfig::mapbox(config.credential_ttl(), config.fetch_timeout()),
            cache,
            mapbox_source,
            injector,
            registry,
        );

        let reference = Arc::new(ReferenceDataCache::new(
            supabase,
            clock,
            config.fetch_timeout(),
        ));

        tracing::info!(
            base_dir = %paths.base_dir().display(),
            sms = %otp.channel_name(),
            "Application state ready"
        );

        Ok(Self {
            config: Arc::new(config),
            paths: Arc::new(paths),
            db,
            otp,
            google_maps,
            mapbox,
            reference,
        })
    }

    pub fn loader(&self, provider: Provider) -> &SingletonLoader {
        match provider {
            Provider::GoogleMaps => &self.google_maps,
            Provider::Mapbox => &self.mapbox,
        }
    }

    /// Database reachable within a short deadline.
    pub async fn database_healthy(&self) -> bool {
        uberfix_config_and_utils::with_deadline(
            Duration::from_secs(2),
            async { self.db.health_check().await.is_ok() },
            false,
        )
        .await
    }

    /// Diagnostic snapshot of every service.
    pub async fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "base_dir": self.paths.base_dir().display().to_string(),
            "database_healthy": self.database_healthy().await,
            "sms_channel": self.otp.channel_name(),
            "loaders": [self.google_maps.status(), self.mapbox.status()],
            "reference_cache": self.reference.stats().await,
        })
    }

    /// Stop accepting loads.
    pub fn shutdown(&self) {
        self.google_maps.dispose();
        self.mapbox.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_for(url: &str) -> Config {
        Config {
            supabase_url: url.to_string(),
            supabase_anon_key: "anon".to_string(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_build_creates_runtime_files() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let state = AppState::build(config_for("http://127.0.0.1:9"), paths).await.unwrap();

        assert!(dir.path().join("uberfix.sqlite").exists());
        assert!(state.database_healthy().await);
        assert_eq!(state.loader(Provider::GoogleMaps).key(), "google_maps");
        assert_eq!(state.loader(Provider::Mapbox).key(), "mapbox");

        let status = state.status().await;
        assert_eq!(status["database_healthy"], true);
        assert_eq!(status["sms_channel"], "log-only");
        assert_eq!(status["loaders"][0]["state"], "idle");
    }

    #[tokio::test]
    async fn test_shutdown_disposes_loaders() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let state = AppState::build(config_for("http://127.0.0.1:9"), paths).await.unwrap();

        state.shutdown();
        assert!(state.google_maps.status().disposed);
        assert!(state.google_maps.load().await.is_err());
    }

    #[test]
    fn test_provider_wire_names() {
        assert_eq!(serde_json::to_string(&Provider::GoogleMaps).unwrap(), "\"google_maps\"");
        let parsed: Provider = serde_json::from_str("\"mapbox\"").unwrap();
        assert_eq!(parsed, Provider::Mapbox);
    }
}
