//! Command handlers. One-shot commands build their own state, run once and
//! print a JSON document; `serve` keeps the broker up until interrupted.

use super::maintenance::{spawn_maintenance_loop, MAINTENANCE_INTERVAL_SECS};
use super::state::{AppState, Provider};
use crate::broker::start_broker;
use otp_engine::api::{send_otp, verify_otp, ApiResponse, SendOtpRequest, VerifyOtpRequest};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn print_json<T: Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn finish_api(response: ApiResponse) -> CommandResult {
    print_json(&response.body)?;
    if response.is_success() {
        Ok(())
    } else {
        Err(format!("request failed with status {}", response.status).into())
    }
}

/// Serve the local broker, with periodic cleanup, until Ctrl-C.
pub async fn run_broker(state: AppState) -> CommandResult {
    let socket_path = state.paths.broker_socket_file();
    let runtime = start_broker(socket_path, state.clone()).await?;
    let maintenance = spawn_maintenance_loop(
        state.clone(),
        Duration::from_secs(MAINTENANCE_INTERVAL_SECS),
    );
    info!(socket = %runtime.socket_path.display(), "Broker ready, waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await;
    maintenance.shutdown().await;
    state.shutdown();
    Ok(())
}

pub async fn run_otp_send(
    state: &AppState,
    phone: String,
    action: Option<String>,
    client: &str,
) -> CommandResult {
    let request = SendOtpRequest {
        phone: Some(phone),
        action,
    };
    finish_api(send_otp(&state.otp, request, client).await)
}

pub async fn run_otp_verify(state: &AppState, phone: String, otp: String) -> CommandResult {
    let request = VerifyOtpRequest {
        phone: Some(phone),
        otp: Some(otp),
    };
    finish_api(verify_otp(&state.otp, request).await)
}

pub async fn run_otp_purge(state: &AppState) -> CommandResult {
    let purged = state.otp.purge_expired().await?;
    print_json(&json!({ "purged": purged }))
}

pub async fn run_maps_load(state: &AppState, provider: Provider) -> CommandResult {
    let loader = state.loader(provider);
    let resource = loader.load().await?;
    print_json(&json!({ "resource": resource, "status": loader.status() }))
}

pub fn run_maps_reset(state: &AppState, provider: Provider) -> CommandResult {
    let loader = state.loader(provider);
    loader.reset();
    print_json(&loader.status())
}

pub fn run_maps_status(state: &AppState) -> CommandResult {
    print_json(&[state.google_maps.status(), state.mapbox.status()])
}

pub async fn run_reference(state: &AppState, key: &str) -> CommandResult {
    let data = state.reference.get(key).await?;
    print_json(&data)
}

pub async fn run_status(state: &AppState) -> CommandResult {
    print_json(&state.status().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use uberfix_config_and_utils::{Config, Paths};

    async fn local_state(dir: &std::path::Path) -> AppState {
        let config = Config {
            supabase_url: "http://127.0.0.1:9".to_string(),
            ..Config::default()
        };
        AppState::build(config, Paths::with_base_dir(dir.to_path_buf()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_otp_commands_report_failures() {
        let dir = tempdir().unwrap();
        let state = local_state(dir.path()).await;

        assert!(run_otp_send(&state, "+201234567890".to_string(), None, "local").await.is_ok());
        assert!(run_otp_send(&state, "12345".to_string(), None, "local").await.is_err());
        assert!(run_otp_verify(&state, "+201234567890".to_string(), "000000".to_string())
            .await
            .is_err());
        assert!(run_otp_purge(&state).await.is_ok());
    }

    #[tokio::test]
    async fn test_maps_reset_and_status() {
        let dir = tempdir().unwrap();
        let state = local_state(dir.path()).await;

        assert!(run_maps_reset(&state, Provider::GoogleMaps).is_ok());
        assert!(run_maps_status(&state).is_ok());
        assert!(run_status(&state).await.is_ok());
    }
}
