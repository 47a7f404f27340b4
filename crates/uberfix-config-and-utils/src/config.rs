//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://zrrffsjbfkphridqyais.supabase.co",
};

/// Default Supabase anon key (can be overridden at compile time via SUPABASE_ANON_KEY env var).
pub const DEFAULT_SUPABASE_ANON_KEY: &str = match option_env!("SUPABASE_ANON_KEY") {
    Some(key) => key,
    None => "anon-key",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Edge function returning `{ "apiKey": .. }`.
pub const DEFAULT_GOOGLE_MAPS_FUNCTION: &str = "get-maps-key";

/// Edge function returning `{ "token": .. }`.
pub const DEFAULT_MAPBOX_FUNCTION: &str = "get-mapbox-token";

/// Map credentials stay cached for 24 hours.
pub const DEFAULT_CREDENTIAL_TTL_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 8_000;

/// Twilio SMS credentials. Absent means codes are stored but not sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number in E.164 form.
    pub phone_number: String,
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase anon key, sent as `apikey` and bearer token.
    #[serde(default = "default_supabase_anon_key")]
    pub supabase_anon_key: String,
    /// Edge function serving the Google Maps key.
    #[serde(default = "default_google_maps_function")]
    pub google_maps_function: String,
    /// Edge function serving the Mapbox token.
    #[serde(default = "default_mapbox_function")]
    pub mapbox_function: String,
    #[serde(default = "default_credential_ttl_secs")]
    pub credential_ttl_secs: u64,
    /// Deadline for one credential fetch or one injection attempt.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Deadline for one OTP delivery attempt.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio: Option<TwilioConfig>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_anon_key() -> String {
    DEFAULT_SUPABASE_ANON_KEY.to_string()
}

fn default_google_maps_function() -> String {
    DEFAULT_GOOGLE_MAPS_FUNCTION.to_string()
}

fn default_mapbox_function() -> String {
    DEFAULT_MAPBOX_FUNCTION.to_string()
}

fn default_credential_ttl_secs() -> u64 {
    DEFAULT_CREDENTIAL_TTL_SECS
}

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS
}

fn default_delivery_timeout_ms() -> u64 {
    DEFAULT_DELIVERY_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: default_supabase_url(),
            supabase_anon_key: default_supabase_anon_key(),
            google_maps_function: default_google_maps_function(),
            mapbox_function: default_mapbox_function(),
            credential_ttl_secs: DEFAULT_CREDENTIAL_TTL_SECS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
            twilio: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from `config.json`, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Twilio settings only take effect when all three variables are present;
    /// a partial set is ignored so a half-configured channel never sends.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        if let Some(level) = non_empty("UBERFIX_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = non_empty("SUPABASE_URL") {
            self.supabase_url = url;
        }
        if let Some(key) = non_empty("SUPABASE_ANON_KEY") {
            self.supabase_anon_key = key;
        }

        match (
            non_empty("TWILIO_ACCOUNT_SID"),
            non_empty("TWILIO_AUTH_TOKEN"),
            non_empty("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(phone_number)) => {
                self.twilio = Some(TwilioConfig {
                    account_sid,
                    auth_token,
                    phone_number,
                });
            }
            (None, None, None) => {}
            _ => {
                tracing::warn!("partial Twilio environment ignored, all three variables are required");
            }
        }
    }

    /// Reject values that would make every load fail later.
    pub fn validate(&self) -> CoreResult<()> {
        self.supabase_url()?;
        if self.credential_ttl_secs == 0 {
            return Err(CoreError::Config(
                "credential_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.fetch_timeout_ms == 0 || self.delivery_timeout_ms == 0 {
            return Err(CoreError::Config("timeouts must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
        assert_eq!(config.google_maps_function, "get-maps-key");
        assert_eq!(config.mapbox_function, "get-mapbox-token");
        assert_eq!(config.credential_ttl(), Duration::from_secs(86_400));
        assert!(config.twilio.is_none());
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "log_level": "debug", "fetch_timeout_ms": 2500 }"#)
            .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.fetch_timeout(), Duration::from_millis(2500));
        assert_eq!(config.delivery_timeout_ms, DEFAULT_DELIVERY_TIMEOUT_MS);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.credential_ttl_secs = 60;
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.credential_ttl_secs, 60);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.credential_ttl_secs, DEFAULT_CREDENTIAL_TTL_SECS);
    }

    #[test]
    fn test_overrides_apply_non_empty_values() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("UBERFIX_LOG_LEVEL", "trace"),
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_ANON_KEY", "  "),
        ]));

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.supabase_url, "https://example.supabase.co");
        assert_eq!(config.supabase_anon_key, DEFAULT_SUPABASE_ANON_KEY);
    }

    #[test]
    fn test_twilio_requires_all_three_variables() {
        let mut partial = Config::default();
        partial.apply_overrides(lookup_from(&[
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "secret"),
        ]));
        assert!(partial.twilio.is_none());

        let mut full = Config::default();
        full.apply_overrides(lookup_from(&[
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "secret"),
            ("TWILIO_PHONE_NUMBER", "+15005550006"),
        ]));
        let twilio = full.twilio.unwrap();
        assert_eq!(twilio.account_sid, "AC123");
        assert_eq!(twilio.phone_number, "+15005550006");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.supabase_url = "not a valid url".to_string();
        assert!(matches!(config.validate(), Err(CoreError::InvalidUrl(_))));

        let mut config = Config::default();
        config.credential_ttl_secs = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = Config::default();
        config.delivery_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_config_supabase_url_parse() {
        let config = Config::default();
        let url = config.supabase_url().unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_twilio_not_serialized_when_absent() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(!json.contains("twilio"));
    }
}
