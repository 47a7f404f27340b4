//! Where passcode records live.

use crate::error::OtpResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uberfix_database::{queries, AsyncDatabase, NewOtpVerification, OtpVerification};

#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert(&self, record: NewOtpVerification) -> OtpResult<OtpVerification>;

    /// Consume the newest unverified, unexpired record for `phone` holding
    /// `code`. True when one was consumed by this call.
    async fn redeem(&self, phone: &str, code: &str, now: DateTime<Utc>) -> OtpResult<bool>;

    /// Delete records whose expiry has passed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> OtpResult<usize>;

    /// Records for `phone`, newest first.
    async fn list_for_phone(&self, phone: &str) -> OtpResult<Vec<OtpVerification>>;
}

/// Records in the local SQLite database.
#[derive(Clone)]
pub struct SqliteOtpStore {
    db: AsyncDatabase,
}

impl SqliteOtpStore {
    pub fn new(db: AsyncDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OtpStore for SqliteOtpStore {
    async fn insert(&self, record: NewOtpVerification) -> OtpResult<OtpVerification> {
        Ok(self.db.call(move |conn| queries::insert_otp(conn, &record)).await?)
    }

    async fn redeem(&self, phone: &str, code: &str, now: DateTime<Utc>) -> OtpResult<bool> {
        let phone = phone.to_string();
        let code = code.to_string();
        // Lookup and update run back to back on the executor thread, so two
        // verifications of one code cannot both see it unverified.
        let redeemed = self
            .db
            .call(move |conn| {
                match queries::find_latest_valid_otp(conn, &phone, &code, now)? {
                    Some(record) => queries::mark_otp_verified(conn, &record.id, now),
                    None => Ok(false),
                }
            })
            .await?;
        Ok(redeemed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> OtpResult<usize> {
        Ok(self
            .db
            .call(move |conn| queries::delete_expired_otps(conn, now))
            .await?)
    }

    async fn list_for_phone(&self, phone: &str) -> OtpResult<Vec<OtpVerification>> {
        let phone = phone.to_string();
        Ok(self
            .db
            .call(move |conn| queries::list_otps_for_phone(conn, &phone))
            .await?)
    }
}

/// Process-local records, for tests and one-shot tools.
#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    records: Mutex<Vec<OtpVerification>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn insert(&self, record: NewOtpVerification) -> OtpResult<OtpVerification> {
        let stored = OtpVerification {
            id: record.id,
            phone: record.phone,
            otp_code: record.otp_code,
            action: record.action,
            expires_at: record.expires_at,
            verified: false,
            verified_at: None,
            created_at: record.created_at,
        };
        self.records.lock().push(stored.clone());
        Ok(stored)
    }

    async fn redeem(&self, phone: &str, code: &str, now: DateTime<Utc>) -> OtpResult<bool> {
        let mut records = self.records.lock();
        // Later pushes win ties on created_at.
        let newest = records
            .iter_mut()
            .enumerate()
            .filter(|(_, r)| r.phone == phone && r.otp_code == code && r.is_redeemable(now))
            .max_by_key(|(index, r)| (r.created_at, *index))
            .map(|(_, r)| r);

        match newest {
            Some(record) => {
                record.verified = true;
                record.verified_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> OtpResult<usize> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.expires_at > now);
        Ok(before - records.len())
    }

    async fn list_for_phone(&self, phone: &str) -> OtpResult<Vec<OtpVerification>> {
        let mut found: Vec<OtpVerification> = self
            .records
            .lock()
            .iter()
            .filter(|r| r.phone == phone)
            .cloned()
            .collect();
        found.reverse();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_700_000_000 + secs)
    }

    async fn stores() -> Vec<Arc<dyn OtpStore>> {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        vec![
            Arc::new(MemoryOtpStore::new()),
            Arc::new(SqliteOtpStore::new(db)),
        ]
    }

    fn record(phone: &str, code: &str, created: i64) -> NewOtpVerification {
        NewOtpVerification::new(phone, code, "verify", at(created), at(created + 600))
    }

    #[tokio::test]
    async fn test_redeem_is_single_use() {
        for store in stores().await {
            store.insert(record("+201234567890", "123456", 0)).await.unwrap();

            assert!(store.redeem("+201234567890", "123456", at(10)).await.unwrap());
            assert!(!store.redeem("+201234567890", "123456", at(11)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_redeem_rejects_expired_and_mismatched() {
        for store in stores().await {
            store.insert(record("+201234567890", "123456", 0)).await.unwrap();

            assert!(!store.redeem("+201234567890", "654321", at(10)).await.unwrap());
            assert!(!store.redeem("+201111111111", "123456", at(10)).await.unwrap());
            assert!(!store.redeem("+201234567890", "123456", at(600)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_redeem_consumes_newest_duplicate() {
        for store in stores().await {
            let older = store.insert(record("+201234567890", "111111", 0)).await.unwrap();
            let newer = store.insert(record("+201234567890", "111111", 60)).await.unwrap();

            assert!(store.redeem("+201234567890", "111111", at(100)).await.unwrap());

            let listed = store.list_for_phone("+201234567890").await.unwrap();
            assert_eq!(listed.len(), 2);
            assert_eq!(listed[0].id, newer.id);
            assert!(listed[0].verified);
            assert_eq!(listed[1].id, older.id);
            assert!(!listed[1].verified);
        }
    }

    #[tokio::test]
    async fn test_purge_expired() {
        for store in stores().await {
            store.insert(record("+201234567890", "111111", 0)).await.unwrap();
            store.insert(record("+201234567890", "222222", 500)).await.unwrap();

            assert_eq!(store.purge_expired(at(700)).await.unwrap(), 1);
            let listed = store.list_for_phone("+201234567890").await.unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].otp_code, "222222");
        }
    }
}
