//! Shared utility functions

use chrono::{DateTime, Utc};

/// Parse a datetime string (RFC3339 format) or return current time
///
/// Timestamps are stored as RFC3339 text; a corrupt value should not make
/// the whole row unreadable.
pub fn parse_datetime_or_now(s: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Normalize an optional email address for storage
///
/// Surrounding whitespace is dropped and blank values become `None`.
///
/// # Examples
///
/// ```
/// use keygate_db::utils::normalize_email;
///
/// assert_eq!(normalize_email(Some("  alice@example.com ")), Some("alice@example.com".to_string()));
/// assert_eq!(normalize_email(Some("   ")), None);
/// assert_eq!(normalize_email(None), None);
/// ```
pub fn normalize_email(email: Option<&str>) -> Option<String> {
    email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
}
