//! Supabase REST and edge-function client.
//!
//! Every request carries the anon key both as `apikey` and as a bearer
//! token. Error bodies are never logged verbatim; only their length and a
//! digest are, since edge functions echo secrets in some failure modes.

use crate::error::{GatewayError, GatewayResult};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Origin the credential edge functions accept.
pub const DEFAULT_APP_ORIGIN: &str = "https://uberfix.shop";

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

#[derive(Clone)]
pub struct SupabaseClient {
    http_client: reqwest::Client,
    api_url: String,
    anon_key: String,
    origin: Option<String>,
}

impl SupabaseClient {
    /// `api_url` is the project URL, e.g. `https://xyz.supabase.co`.
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), api_url, anon_key)
    }

    /// Share an existing connection pool.
    pub fn with_http_client(
        http_client: reqwest::Client,
        api_url: impl Into<String>,
        anon_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            origin: None,
        }
    }

    /// Send an `Origin` header with every request.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Build the REST API URL for a table.
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.api_url, name)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .header("Accept", "application/json");
        match &self.origin {
            Some(origin) => request.header("Origin", origin),
            None => request,
        }
    }

    async fn read_json(operation: &str, response: reqwest::Response) -> GatewayResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(
                operation = %operation,
                status = %status,
                body_summary = %body_summary,
                "Supabase request failed"
            );
            return Err(GatewayError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                body_summary,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    /// POST `body` to an edge function and return its JSON reply.
    ///
    /// `timeout` bounds the whole exchange.
    pub async fn invoke_function(
        &self,
        name: &str,
        body: &Value,
        timeout: Duration,
    ) -> GatewayResult<Value> {
        if name.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "edge function name is empty".to_string(),
            ));
        }

        tracing::debug!(function = %name, "Invoking edge function");

        let response = self
            .authorize(self.http_client.post(self.function_url(name)))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        Self::read_json(name, response).await
    }

    /// Read rows from a table with PostgREST query parameters,
    /// e.g. `[("select", "*"), ("order", "name_ar")]`.
    pub async fn select(
        &self,
        table: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> GatewayResult<Value> {
        tracing::debug!(table = %table, "Selecting rows");

        let response = self
            .authorize(self.http_client.get(self.rest_url(table)))
            .query(query)
            .timeout(timeout)
            .send()
            .await?;

        let rows = Self::read_json(table, response).await?;
        if let Value::Array(items) = &rows {
            tracing::debug!(table = %table, rows = items.len(), "Fetched rows");
        }
        Ok(rows)
    }
}
