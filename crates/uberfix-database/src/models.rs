//! Database model types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Action tag stored when the caller does not give one.
pub const DEFAULT_OTP_ACTION: &str = "verify";

/// A stored one-time passcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpVerification {
    pub id: String,
    pub phone: String,
    pub otp_code: String,
    pub action: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OtpVerification {
    /// Whether this record can still be redeemed at `now`.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.verified && now < self.expires_at
    }
}

/// Input for inserting a passcode.
#[derive(Debug, Clone)]
pub struct NewOtpVerification {
    pub id: String,
    pub phone: String,
    pub otp_code: String,
    pub action: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewOtpVerification {
    /// New record with a random id.
    pub fn new(
        phone: impl Into<String>,
        otp_code: impl Into<String>,
        action: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            phone: phone.into(),
            otp_code: otp_code.into(),
            action: action.into(),
            expires_at,
            created_at,
        }
    }
}

/// Canonical text form for stored timestamps.
pub fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp. Unparsable values sort as the Unix epoch,
/// which reads as long expired.
pub fn parse_datetime(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_is_lexicographically_ordered() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let late = early + Duration::milliseconds(1);
        assert!(format_datetime(early) < format_datetime(late));
        assert_eq!(format_datetime(early), "2024-01-09T23:59:59.000Z");
    }

    #[test]
    fn test_parse_roundtrip_and_fallback() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_datetime(&format_datetime(now)), now);
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_is_redeemable() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = OtpVerification {
            id: "id".into(),
            phone: "+201012345678".into(),
            otp_code: "123456".into(),
            action: DEFAULT_OTP_ACTION.into(),
            expires_at: now + Duration::minutes(10),
            verified: false,
            verified_at: None,
            created_at: now,
        };
        assert!(record.is_redeemable(now));
        assert!(!record.is_redeemable(now + Duration::minutes(10)));
        assert!(!OtpVerification { verified: true, ..record }.is_redeemable(now));
    }
}
