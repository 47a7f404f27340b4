//! Deadline helper for calls that must never hang.

use std::future::Future;
use std::time::Duration;

/// Race `future` against `duration`; on expiry log a warning and return
/// `fallback`. The future is dropped when the deadline fires.
pub async fn with_deadline<F, T>(duration: Duration, future: F, fallback: T) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(
                timeout_ms = duration.as_millis() as u64,
                "operation exceeded deadline, using fallback"
            );
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fast_future_wins() {
        let value = with_deadline(Duration::from_secs(1), async { 7 }, 0).await;
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_future_falls_back() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            "late"
        };
        let value = with_deadline(Duration::from_millis(50), slow, "fallback").await;
        assert_eq!(value, "fallback");
    }
}
