use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Format a UTC instant as ISO 8601 (``2026-02-23T14:30:00.000Z``).
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse a strict RFC 3339 datetime with an explicit offset.
///
/// Match windows submitted over the API must carry their offset; naive
/// datetimes are rejected here.
pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an ISO 8601 / RFC 3339 datetime string leniently.
///
/// Returns ``None`` on unparseable input.
///
/// Accepts:
/// - ``2026-02-23T14:30:00Z``
/// - ``2026-02-23T14:30:00.123+02:00``
/// - ``2026-02-23T14:30:00``  (assumes UTC)
/// - ``2026-02-23``           (start of day UTC)
pub fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Some(dt) = parse_rfc3339(s) {
        return Some(dt);
    }
    // naive, taken as UTC
    for fmt in &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    // Date only
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|nd| nd.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}
