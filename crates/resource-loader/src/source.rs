//! Where credentials come from.

use crate::error::{LoadError, LoadResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use supabase_gateway::SupabaseClient;

/// Remote (or local) origin of one credential.
///
/// `fetch` is called only on a cache miss and at most once per load attempt.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn fetch(&self) -> LoadResult<String>;
}

/// Credential served by a Supabase edge function.
pub struct EdgeFunctionSource {
    client: SupabaseClient,
    function: String,
    field: &'static str,
    timeout: Duration,
}

impl EdgeFunctionSource {
    pub fn new(
        client: SupabaseClient,
        function: impl Into<String>,
        field: &'static str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            function: function.into(),
            field,
            timeout,
        }
    }

    /// `get-maps-key` style function replying `{"apiKey": ..}`.
    pub fn google_maps(client: SupabaseClient, function: impl Into<String>, timeout: Duration) -> Self {
        Self::new(client, function, "apiKey", timeout)
    }

    /// `get-mapbox-token` style function replying `{"token": ..}`.
    pub fn mapbox(client: SupabaseClient, function: impl Into<String>, timeout: Duration) -> Self {
        Self::new(client, function, "token", timeout)
    }

    fn extract(&self, reply: &Value) -> LoadResult<String> {
        match reply.get(self.field).and_then(Value::as_str) {
            Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
            _ => {
                // A reply without the field usually carries {"error": ..}.
                let reason = reply
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("credential missing from response");
                Err(LoadError::Configuration(format!(
                    "{} returned no {}: {}",
                    self.function, self.field, reason
                )))
            }
        }
    }
}

#[async_trait]
impl CredentialSource for EdgeFunctionSource {
    fn name(&self) -> &str {
        &self.function
    }

    async fn fetch(&self) -> LoadResult<String> {
        let reply = self
            .client
            .invoke_function(&self.function, &json!({}), self.timeout)
            .await?;
        let credential = self.extract(&reply)?;

        if let Some(source) = reply.get("keySource").and_then(Value::as_str) {
            tracing::debug!(function = %self.function, key_source = %source, "Credential fetched");
        } else {
            tracing::debug!(function = %self.function, "Credential fetched");
        }
        Ok(credential)
    }
}

/// Credential read from a process environment variable.
#[derive(Debug, Clone)]
pub struct EnvSource {
    var: String,
}

impl EnvSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialSource for EnvSource {
    fn name(&self) -> &str {
        &self.var
    }

    async fn fetch(&self) -> LoadResult<String> {
        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(LoadError::Configuration(format!("{} is not set", self.var))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_edge_function_source_reads_api_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/functions/v1/get-maps-key")
            .with_status(200)
            .with_body(r#"{"apiKey":"ABC123","keySource":"primary"}"#)
            .create_async()
            .await;

        let source = EdgeFunctionSource::google_maps(
            SupabaseClient::new(server.url(), "anon"),
            "get-maps-key",
            TIMEOUT,
        );
        assert_eq!(source.name(), "get-maps-key");
        assert_eq!(source.fetch().await.unwrap(), "ABC123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_edge_function_source_missing_field_is_configuration_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/functions/v1/get-mapbox-token")
            .with_status(200)
            .with_body(r#"{"error":"Mapbox token not configured"}"#)
            .create_async()
            .await;

        let source = EdgeFunctionSource::mapbox(
            SupabaseClient::new(server.url(), "anon"),
            "get-mapbox-token",
            TIMEOUT,
        );
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(&err, LoadError::Configuration(msg) if msg.contains("not configured")));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_edge_function_source_server_error_is_transient() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/functions/v1/get-maps-key")
            .with_status(502)
            .create_async()
            .await;

        let source = EdgeFunctionSource::google_maps(
            SupabaseClient::new(server.url(), "anon"),
            "get-maps-key",
            TIMEOUT,
        );
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, LoadError::Fetch { transient: true, .. }));
    }

    #[tokio::test]
    async fn test_env_source() {
        let var = "UBERFIX_TEST_ENV_SOURCE_TOKEN";
        let source = EnvSource::new(var);

        std::env::remove_var(var);
        assert!(matches!(source.fetch().await, Err(LoadError::Configuration(_))));

        std::env::set_var(var, "pk.test");
        assert_eq!(source.fetch().await.unwrap(), "pk.test");
        std::env::remove_var(var);
    }
}
