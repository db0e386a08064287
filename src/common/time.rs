//! SAML `xs:dateTime` formatting/parsing and the ±90s timing window (spec §4.3, §6).

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// The clock-skew allowance applied to `IssueInstant`, `NotOnOrAfter` and `NotBefore`.
pub const TIMING_SKEW_SECONDS: i64 = 90;

/// Formats a timestamp as `YYYY-MM-DDThh:mm:ssZ` (second precision, UTC), per spec §6.
pub fn format_instant(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a SAML `xs:dateTime` value. Accepts an optional fractional-seconds component
/// for interop with IdPs that emit one; always returns UTC.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// `now - ts < skew` check used by the cookie codec (§3) and IssueInstant validation (§4.3).
pub fn within_skew(now: DateTime<Utc>, ts: DateTime<Utc>, skew_seconds: i64) -> bool {
    let delta = (now - ts).num_seconds();
    delta.abs() <= skew_seconds
}

/// `NotOnOrAfter` must be strictly after `now - skew`.
pub fn not_on_or_after_ok(now: DateTime<Utc>, not_on_or_after: DateTime<Utc>) -> bool {
    not_on_or_after > now - Duration::seconds(TIMING_SKEW_SECONDS)
}

/// `NotBefore` must be strictly before `now + skew`.
pub fn not_before_ok(now: DateTime<Utc>, not_before: DateTime<Utc>) -> bool {
    not_before < now + Duration::seconds(TIMING_SKEW_SECONDS)
}

/// `IssueInstant` must be within ±skew of now.
pub fn issue_instant_ok(now: DateTime<Utc>, issue_instant: DateTime<Utc>) -> bool {
    within_skew(now, issue_instant, TIMING_SKEW_SECONDS)
}
