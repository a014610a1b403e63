//! The shared timestamp codec.
//!
//! Every persisted date is RFC 3339 in UTC with millisecond precision and a
//! `Z` suffix, e.g. `2024-03-01T12:30:00.250Z`. Timestamps produced by
//! [`now`] are already truncated to milliseconds so they survive a store
//! round trip unchanged.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Returns the current time truncated to milliseconds.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Formats a timestamp for storage.
#[must_use]
pub fn format(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a stored timestamp.
///
/// Any RFC 3339 offset is accepted and converted to UTC.
///
/// # Errors
///
/// Returns the parse error if the text is not RFC 3339.
pub fn parse(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|at| at.with_timezone(&Utc))
}
