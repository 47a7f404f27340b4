//! Issue and verify passcodes.

use crate::code::generate_code;
use crate::delivery::{DeliveryChannel, DeliveryStatus, OtpMessage};
use crate::error::{LimitScope, OtpError, OtpResult};
use crate::phone::normalize_phone;
use crate::rate_limit::{FixedWindowLimiter, RateLimitPolicy};
use crate::store::OtpStore;
use chrono::{DateTime, Utc};
use observability::mask_phone;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uberfix_config_and_utils::{with_deadline, Clock};
use uberfix_database::{NewOtpVerification, DEFAULT_OTP_ACTION};

/// Lifetime of an issued code.
pub const OTP_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    pub ttl: Duration,
    pub per_client: RateLimitPolicy,
    pub per_phone: RateLimitPolicy,
    pub verify_attempts: RateLimitPolicy,
    pub delivery_timeout: Duration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(OTP_TTL_SECS),
            per_client: RateLimitPolicy::per_client(),
            per_phone: RateLimitPolicy::per_phone(),
            verify_attempts: RateLimitPolicy::verify_attempts(),
            delivery_timeout: Duration::from_millis(8_000),
        }
    }
}

/// A stored code and what happened to its delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueOutcome {
    /// Normalised phone number the code was stored under.
    pub phone: String,
    pub expires_in_seconds: u64,
    pub expires_at: DateTime<Utc>,
    /// Issuance requests left for this phone in the current window.
    pub remaining: u32,
    pub delivery: DeliveryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
}

pub struct OtpService {
    store: Arc<dyn OtpStore>,
    channel: Arc<dyn DeliveryChannel>,
    clock: Arc<dyn Clock>,
    policy: OtpPolicy,
    client_limiter: FixedWindowLimiter,
    phone_limiter: FixedWindowLimiter,
    verify_limiter: FixedWindowLimiter,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        channel: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
        policy: OtpPolicy,
    ) -> Self {
        Self {
            client_limiter: FixedWindowLimiter::new(policy.per_client, clock.clone()),
            phone_limiter: FixedWindowLimiter::new(policy.per_phone, clock.clone()),
            verify_limiter: FixedWindowLimiter::new(policy.verify_attempts, clock.clone()),
            store,
            channel,
            clock,
            policy,
        }
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Open rate-limit windows across all three limiters.
    pub fn rate_limit_windows(&self) -> usize {
        self.client_limiter.tracked_keys()
            + self.phone_limiter.tracked_keys()
            + self.verify_limiter.tracked_keys()
    }

    /// Store a fresh code for `phone` and try to deliver it.
    ///
    /// `client` identifies the caller (an address) for the per-client limit.
    /// Delivery problems are reported in the outcome, never as an error.
    pub async fn issue(
        &self,
        phone: &str,
        action: Option<&str>,
        client: &str,
    ) -> OtpResult<IssueOutcome> {
        let client_check = self.client_limiter.check(&format!("ip:{}", client));
        if !client_check.allowed {
            warn!(client = %client, "Client exceeded OTP request limit");
            return Err(OtpError::RateLimited {
                scope: LimitScope::Client,
                retry_after_secs: client_check.retry_after_secs,
            });
        }

        let phone = normalize_phone(phone)?;
        let action = action
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_OTP_ACTION);

        let phone_check = self.phone_limiter.check(&format!("phone:{}", phone));
        if !phone_check.allowed {
            warn!(phone = %mask_phone(&phone), "Phone exceeded OTP request limit");
            return Err(OtpError::RateLimited {
                scope: LimitScope::Phone,
                retry_after_secs: phone_check.retry_after_secs,
            });
        }

        let code = generate_code();
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.policy.ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(OTP_TTL_SECS as i64));
        let expires_at = now + ttl;

        let record = self
            .store
            .insert(NewOtpVerification::new(&phone, &code, action, now, expires_at))
            .await?;

        let message = OtpMessage::new(&phone, code);
        let delivery = with_deadline(
            self.policy.delivery_timeout,
            async {
                match self.channel.deliver(&message).await {
                    Ok(status) => status,
                    Err(err) => {
                        warn!(
                            channel = %self.channel.name(),
                            error = %err,
                            "OTP delivery failed, code remains stored"
                        );
                        DeliveryStatus::Failed {
                            reason: err.to_string(),
                        }
                    }
                }
            },
            DeliveryStatus::TimedOut,
        )
        .await;

        info!(
            phone = %mask_phone(&phone),
            action = %record.action,
            delivered = delivery.is_sent(),
            "OTP issued"
        );

        Ok(IssueOutcome {
            phone,
            expires_in_seconds: self.policy.ttl.as_secs(),
            expires_at: record.expires_at,
            remaining: phone_check.remaining,
            delivery,
        })
    }

    /// Redeem `code` for `phone`. A wrong code, an expired code and a used
    /// code all read as `success: false`.
    pub async fn verify(&self, phone: &str, code: &str) -> OtpResult<VerifyOutcome> {
        if phone.trim().is_empty() {
            return Err(OtpError::MissingField("phone"));
        }
        let code = code.trim();
        if code.is_empty() {
            return Err(OtpError::MissingField("otp"));
        }
        let phone = normalize_phone(phone)?;

        let check = self.verify_limiter.check(&format!("verify:{}", phone));
        if !check.allowed {
            warn!(phone = %mask_phone(&phone), "Too many verification attempts");
            return Err(OtpError::RateLimited {
                scope: LimitScope::Verify,
                retry_after_secs: check.retry_after_secs,
            });
        }

        let success = self.store.redeem(&phone, code, self.clock.now()).await?;
        if success {
            info!(phone = %mask_phone(&phone), "OTP verified");
        } else {
            info!(phone = %mask_phone(&phone), "Invalid OTP attempt");
        }
        Ok(VerifyOutcome { success })
    }

    /// Delete expired records and forget closed rate-limit windows.
    pub async fn purge_expired(&self) -> OtpResult<usize> {
        let removed = self.store.purge_expired(self.clock.now()).await?;
        let windows = self.client_limiter.prune()
            + self.phone_limiter.prune()
            + self.verify_limiter.prune();
        info!(removed, windows, "Purged expired OTP state");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryError, LogOnlyChannel};
    use crate::store::MemoryOtpStore;
    use async_trait::async_trait;
    use uberfix_config_and_utils::ManualClock;

    const PHONE: &str = "+201234567890";

    struct RejectingChannel;

    #[async_trait]
    impl DeliveryChannel for RejectingChannel {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn deliver(&self, _message: &OtpMessage) -> Result<DeliveryStatus, DeliveryError> {
            Err(DeliveryError::Rejected {
                status: 503,
                code: None,
            })
        }
    }

    struct HangingChannel;

    #[async_trait]
    impl DeliveryChannel for HangingChannel {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn deliver(&self, _message: &OtpMessage) -> Result<DeliveryStatus, DeliveryError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(DeliveryStatus::Sent { provider_id: None })
        }
    }

    fn service_with(channel: Arc<dyn DeliveryChannel>) -> (OtpService, Arc<MemoryOtpStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryOtpStore::new());
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let service = OtpService::new(store.clone(), channel, clock.clone(), OtpPolicy::default());
        (service, store, clock)
    }

    async fn issued_code(store: &MemoryOtpStore) -> String {
        store.list_for_phone(PHONE).await.unwrap()[0].otp_code.clone()
    }

    #[tokio::test]
    async fn test_issue_stores_code_with_ten_minute_expiry() {
        let (service, store, clock) = service_with(Arc::new(LogOnlyChannel));

        let outcome = service.issue("0020 123 456 7890", None, "10.0.0.1").await.unwrap();
        assert_eq!(outcome.phone, PHONE);
        assert_eq!(outcome.expires_in_seconds, 600);
        assert_eq!(outcome.remaining, 4);
        assert_eq!(outcome.delivery, DeliveryStatus::NotConfigured);

        let records = store.list_for_phone(PHONE).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "verify");
        assert_eq!(records[0].expires_at, clock.now() + chrono::Duration::seconds(600));
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_fail_issue() {
        let (service, store, _clock) = service_with(Arc::new(RejectingChannel));

        let outcome = service.issue(PHONE, Some("login"), "10.0.0.1").await.unwrap();
        assert!(matches!(outcome.delivery, DeliveryStatus::Failed { .. }));
        assert_eq!(store.list_for_phone(PHONE).await.unwrap()[0].action, "login");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_delivery_times_out() {
        let (service, store, _clock) = service_with(Arc::new(HangingChannel));

        let outcome = service.issue(PHONE, None, "10.0.0.1").await.unwrap();
        assert_eq!(outcome.delivery, DeliveryStatus::TimedOut);
        assert_eq!(store.list_for_phone(PHONE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_round_trip_is_single_use() {
        let (service, store, _clock) = service_with(Arc::new(LogOnlyChannel));
        service.issue(PHONE, None, "10.0.0.1").await.unwrap();
        let code = issued_code(&store).await;

        assert!(service.verify(PHONE, &code).await.unwrap().success);
        assert!(!service.verify(PHONE, &code).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_expired_code_never_verifies() {
        let (service, store, clock) = service_with(Arc::new(LogOnlyChannel));
        service.issue(PHONE, None, "10.0.0.1").await.unwrap();
        let code = issued_code(&store).await;

        clock.advance(Duration::from_secs(600));
        assert!(!service.verify(PHONE, &code).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_verify_validates_before_side_effects() {
        let (service, _store, _clock) = service_with(Arc::new(LogOnlyChannel));

        assert!(matches!(service.verify("", "123456").await, Err(OtpError::MissingField("phone"))));
        assert!(matches!(service.verify(PHONE, " ").await, Err(OtpError::MissingField("otp"))));
        assert!(matches!(service.issue("12345", None, "c").await, Err(OtpError::InvalidPhone)));
    }

    #[tokio::test]
    async fn test_issue_rate_limited_per_phone() {
        let (service, _store, clock) = service_with(Arc::new(LogOnlyChannel));
        for _ in 0..5 {
            service.issue(PHONE, None, "10.0.0.1").await.unwrap();
        }

        match service.issue(PHONE, None, "10.0.0.2").await {
            Err(OtpError::RateLimited { scope, retry_after_secs }) => {
                assert_eq!(scope, LimitScope::Phone);
                assert_eq!(retry_after_secs, 600);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        clock.advance(Duration::from_secs(601));
        assert!(service.issue(PHONE, None, "10.0.0.1").await.is_ok());
    }

    #[tokio::test]
    async fn test_issue_rate_limited_per_client() {
        let (service, _store, _clock) = service_with(Arc::new(LogOnlyChannel));
        for _ in 0..100 {
            // Invalid numbers still count against the client.
            let _ = service.issue("invalid", None, "10.0.0.9").await;
        }

        assert!(matches!(
            service.issue(PHONE, None, "10.0.0.9").await,
            Err(OtpError::RateLimited { scope: LimitScope::Client, .. })
        ));
        assert!(service.issue(PHONE, None, "10.0.0.10").await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_attempts_limited() {
        let (service, store, _clock) = service_with(Arc::new(LogOnlyChannel));
        service.issue(PHONE, None, "10.0.0.1").await.unwrap();
        let code = issued_code(&store).await;

        for _ in 0..5 {
            assert!(!service.verify(PHONE, "000000").await.unwrap().success);
        }
        assert!(matches!(
            service.verify(PHONE, &code).await,
            Err(OtpError::RateLimited { scope: LimitScope::Verify, .. })
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (service, _store, clock) = service_with(Arc::new(LogOnlyChannel));
        service.issue(PHONE, None, "10.0.0.1").await.unwrap();

        assert_eq!(service.purge_expired().await.unwrap(), 0);
        clock.advance(Duration::from_secs(601));
        assert_eq!(service.purge_expired().await.unwrap(), 1);
    }
}
