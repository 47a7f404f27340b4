//! Periodic cleanup for a long-running broker: expired OTP rows, closed
//! rate-limit windows and stale reference entries.

use super::state::AppState;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

pub const MAINTENANCE_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub otp_records: usize,
    pub reference_entries: usize,
}

/// One cleanup pass.
pub async fn run_maintenance(state: &AppState) -> MaintenanceReport {
    let otp_records = match state.otp.purge_expired().await {
        Ok(removed) => removed,
        Err(err) => {
            warn!(error = %err, "Failed to purge expired OTP records");
            0
        }
    };
    let reference_entries = state.reference.prune_expired().await;

    let report = MaintenanceReport {
        otp_records,
        reference_entries,
    };
    debug!(
        otp_records,
        reference_entries,
        rate_limit_windows = state.otp.rate_limit_windows(),
        "Maintenance pass finished"
    );
    report
}

pub struct MaintenanceRuntime {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MaintenanceRuntime {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "Maintenance task ended abnormally");
        }
    }
}

/// Run [`run_maintenance`] every `every` until shut down.
pub fn spawn_maintenance_loop(state: AppState, every: Duration) -> MaintenanceRuntime {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    run_maintenance(&state).await;
                }
            }
        }
    });

    MaintenanceRuntime { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use uberfix_config_and_utils::{Config, ManualClock, Paths};

    const PHONE: &str = "+201234567890";

    async fn state_at(dir: &std::path::Path, clock: Arc<ManualClock>) -> AppState {
        let config = Config {
            supabase_url: "http://127.0.0.1:9".to_string(),
            ..Config::default()
        };
        AppState::build_with_clock(config, Paths::with_base_dir(dir.to_path_buf()), clock)
            .await
            .unwrap()
    }

    async fn seed(state: &AppState) {
        state.otp.issue(PHONE, None, "10.0.0.1").await.unwrap();
        state.otp.verify(PHONE, "000000").await.unwrap();
        state
            .reference
            .set("api_responses:a", serde_json::json!(1), Some(Duration::from_secs(60)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pass_clears_expired_state() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let state = state_at(dir.path(), clock.clone()).await;
        seed(&state).await;
        assert_eq!(state.otp.rate_limit_windows(), 3);

        assert_eq!(run_maintenance(&state).await, MaintenanceReport::default());

        clock.advance(Duration::from_secs(2 * 3_600));
        assert_eq!(
            run_maintenance(&state).await,
            MaintenanceReport {
                otp_records: 1,
                reference_entries: 1,
            }
        );
        assert_eq!(state.otp.rate_limit_windows(), 0);
        assert_eq!(state.reference.stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_loop_runs_until_shutdown() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let state = state_at(dir.path(), clock.clone()).await;
        seed(&state).await;
        clock.advance(Duration::from_secs(2 * 3_600));

        let runtime = spawn_maintenance_loop(state.clone(), Duration::from_millis(20));
        let mut cleared = false;
        for _ in 0..100 {
            if state.otp.rate_limit_windows() == 0 && state.reference.stats().await.size == 0 {
                cleared = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        runtime.shutdown().await;

        assert!(cleared);
        assert_eq!(state.otp.purge_expired().await.unwrap(), 0);
    }
}
