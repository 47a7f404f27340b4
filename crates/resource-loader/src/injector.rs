//! Make a credential-backed resource available.

use crate::error::{LoadError, LoadResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use url::Url;

const REDACTED: &str = "***";

/// URL of a remote resource with the credential as one query parameter,
/// followed by a fixed, ordered parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTemplate {
    pub provider: String,
    pub base_url: String,
    pub credential_param: String,
    /// Appended verbatim, in order.
    pub params: Vec<(String, String)>,
}

impl ResourceTemplate {
    /// Google Maps JavaScript API with the libraries and locale the app uses.
    pub fn google_maps() -> Self {
        Self {
            provider: "google_maps".to_string(),
            base_url: "https://maps.googleapis.com/maps/api/js".to_string(),
            credential_param: "key".to_string(),
            params: vec![
                ("libraries".to_string(), "places,geometry,marker".to_string()),
                ("language".to_string(), "ar".to_string()),
                ("region".to_string(), "EG".to_string()),
                ("v".to_string(), "weekly".to_string()),
            ],
        }
    }

    /// Mapbox streets style document.
    pub fn mapbox_style() -> Self {
        Self {
            provider: "mapbox".to_string(),
            base_url: "https://api.mapbox.com/styles/v1/mapbox/streets-v12".to_string(),
            credential_param: "access_token".to_string(),
            params: Vec::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build(&self, credential_value: &str) -> String {
        let mut rendered = format!(
            "{}?{}={}",
            self.base_url, self.credential_param, credential_value
        );
        for (name, value) in &self.params {
            rendered.push('&');
            rendered.push_str(name);
            rendered.push('=');
            rendered.push_str(value);
        }
        rendered
    }

    /// Full request URL for `credential`.
    pub fn render(&self, credential: &str) -> LoadResult<Url> {
        if credential.is_empty() {
            return Err(LoadError::Configuration(format!(
                "empty credential for {}",
                self.provider
            )));
        }
        let encoded: String = url::form_urlencoded::byte_serialize(credential.as_bytes()).collect();
        Url::parse(&self.build(&encoded)).map_err(|e| {
            LoadError::Configuration(format!("invalid {} resource URL: {}", self.provider, e))
        })
    }

    /// URL with the credential masked, safe to log or return.
    pub fn redacted(&self) -> String {
        self.build(REDACTED)
    }
}

/// A resource that answered its readiness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedResource {
    pub provider: String,
    /// Request URL with the credential masked.
    pub url: String,
    pub loaded_at: DateTime<Utc>,
}

/// One side-effecting attempt to make a resource available.
///
/// Implementations must not retry; the loader decides when to try again.
#[async_trait]
pub trait ResourceInjector: Send + Sync {
    async fn inject(&self, credential: &str, template: &ResourceTemplate) -> LoadResult<LoadedResource>;
}

/// Injects a resource by fetching its URL once; 2xx means ready.
#[derive(Clone)]
pub struct HttpResourceInjector {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpResourceInjector {
    pub fn new(timeout: Duration) -> Self {
        Self::with_http_client(reqwest::Client::new(), timeout)
    }

    pub fn with_http_client(http_client: reqwest::Client, timeout: Duration) -> Self {
        Self { http_client, timeout }
    }
}

#[async_trait]
impl ResourceInjector for HttpResourceInjector {
    async fn inject(&self, credential: &str, template: &ResourceTemplate) -> LoadResult<LoadedResource> {
        let url = template.render(credential)?;
        let redacted = template.redacted();

        tracing::debug!(provider = %template.provider, url = %redacted, "Injecting resource");

        let response = self
            .http_client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LoadError::Injection {
                status: None,
                // reqwest errors embed the URL, and with it the credential.
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(provider = %template.provider, status = %status, "Resource rejected");
            return Err(LoadError::Injection {
                status: Some(status.as_u16()),
                message: format!("{} responded {}", template.provider, status),
            });
        }

        Ok(LoadedResource {
            provider: template.provider.clone(),
            url: redacted,
            loaded_at: Utc::now(),
        })
    }
}
