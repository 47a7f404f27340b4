use crate::error::{OtpError, OtpResult};
use regex::Regex;
use std::sync::OnceLock;

fn egyptian_mobile() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:\+20|0020|20)?(1[0125]\d{8})$").expect("phone pattern is valid")
    })
}

/// Canonical `+201XXXXXXXXX` form of an Egyptian mobile number.
///
/// Whitespace is ignored. Accepts the `+20`, `0020` and `20` prefixes or
/// none.
pub fn normalize_phone(raw: &str) -> OtpResult<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(OtpError::MissingField("phone"));
    }

    egyptian_mobile()
        .captures(&compact)
        .and_then(|caps| caps.get(1))
        .map(|national| format!("+20{}", national.as_str()))
        .ok_or(OtpError::InvalidPhone)
}
