//! Query functions over a borrowed connection.
//!
//! Run them through [`AsyncDatabase::call`](crate::AsyncDatabase::call).

use crate::models::{format_datetime, parse_datetime};
use crate::{DatabaseError, DatabaseResult, NewOtpVerification, OtpVerification};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const OTP_COLUMNS: &str =
    "id, phone, otp_code, action, expires_at, verified, verified_at, created_at";

fn otp_from_row(row: &Row<'_>) -> rusqlite::Result<OtpVerification> {
    Ok(OtpVerification {
        id: row.get(0)?,
        phone: row.get(1)?,
        otp_code: row.get(2)?,
        action: row.get(3)?,
        expires_at: parse_datetime(&row.get::<_, String>(4)?),
        verified: row.get(5)?,
        verified_at: row
            .get::<_, Option<String>>(6)?
            .map(|raw| parse_datetime(&raw)),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

// ==========================================
// OTP verifications
// ==========================================

/// Insert a passcode. Earlier outstanding codes for the phone are kept.
pub fn insert_otp(conn: &Connection, otp: &NewOtpVerification) -> DatabaseResult<OtpVerification> {
    conn.execute(
        "INSERT INTO otp_verifications (id, phone, otp_code, action, expires_at, verified, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            otp.id,
            otp.phone,
            otp.otp_code,
            otp.action,
            format_datetime(otp.expires_at),
            format_datetime(otp.created_at),
        ],
    )?;
    get_otp(conn, &otp.id)?
        .ok_or_else(|| DatabaseError::NotFound("OTP not found after insert".to_string()))
}

/// Get a passcode record by ID.
pub fn get_otp(conn: &Connection, id: &str) -> DatabaseResult<Option<OtpVerification>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM otp_verifications WHERE id = ?1",
        OTP_COLUMNS
    ))?;
    Ok(stmt.query_row(params![id], otp_from_row).optional()?)
}

/// Newest unverified, unexpired record matching phone and code.
pub fn find_latest_valid_otp(
    conn: &Connection,
    phone: &str,
    code: &str,
    now: DateTime<Utc>,
) -> DatabaseResult<Option<OtpVerification>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM otp_verifications
         WHERE phone = ?1 AND otp_code = ?2 AND verified = 0 AND expires_at > ?3
         ORDER BY created_at DESC, rowid DESC
         LIMIT 1",
        OTP_COLUMNS
    ))?;
    Ok(stmt
        .query_row(params![phone, code, format_datetime(now)], otp_from_row)
        .optional()?)
}

/// Flip `verified` on an unverified record.
///
/// Returns false when the record was already consumed, so two racing
/// verifications of one code cannot both succeed.
pub fn mark_otp_verified(conn: &Connection, id: &str, now: DateTime<Utc>) -> DatabaseResult<bool> {
    let rows = conn.execute(
        "UPDATE otp_verifications SET verified = 1, verified_at = ?2
         WHERE id = ?1 AND verified = 0",
        params![id, format_datetime(now)],
    )?;
    Ok(rows > 0)
}

/// Delete every record whose expiry has passed. Returns the number removed.
pub fn delete_expired_otps(conn: &Connection, now: DateTime<Utc>) -> DatabaseResult<usize> {
    let removed = conn.execute(
        "DELETE FROM otp_verifications WHERE expires_at <= ?1",
        params![format_datetime(now)],
    )?;
    debug!(removed, "Deleted expired OTP records");
    Ok(removed)
}

/// Records for a phone, newest first.
pub fn list_otps_for_phone(conn: &Connection, phone: &str) -> DatabaseResult<Vec<OtpVerification>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM otp_verifications WHERE phone = ?1 ORDER BY created_at DESC, rowid DESC",
        OTP_COLUMNS
    ))?;
    let records = stmt
        .query_map(params![phone], otp_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}
