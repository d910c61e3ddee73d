//! Shared helpers: timestamps, expirations and request field checks.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{AppError, Result, msg};

pub const SECONDS_PER_DAY: i64 = 86400;

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// RFC 3339 rendering of a unix timestamp, e.g. `2025-01-31T12:00:00Z`.
pub fn iso8601(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn iso8601_opt(ts: Option<i64>) -> Option<String> {
    ts.map(iso8601)
}

/// Calculated license expiration for a new purchase.
#[derive(Debug, Clone, Copy)]
pub struct LicenseExpirations {
    /// None = perpetual
    pub license_exp: Option<i64>,
}

impl LicenseExpirations {
    /// Lifetime plans never get an expiry, whatever the configured term.
    pub fn from_days(license_days: Option<i32>, lifetime: bool, base_time: i64) -> Self {
        Self {
            license_exp: license_days
                .filter(|_| !lifetime)
                .map(|days| base_time + (days as i64) * SECONDS_PER_DAY),
        }
    }
}

/// Permissive email sanity check: one `@`, non-empty local part, dotted domain.
pub fn validate_email_format(email: &str) -> Result<()> {
    let email = email.trim();
    let invalid = || AppError::BadRequest(msg::INVALID_EMAIL.into());

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(())
}

/// Trimmed, non-empty value of an optional request field.
pub fn required<'a>(value: &'a Option<String>) -> Option<&'a str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
