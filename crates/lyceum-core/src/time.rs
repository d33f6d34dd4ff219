use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical timestamp: fixed-width RFC 3339 UTC with microsecond
/// precision. Every stored timestamp uses this form, so lexicographic
/// comparison (and SQL `MAX()` over TEXT columns) matches time order.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Re-encode an arbitrary RFC 3339 string into the canonical form.
/// Returns None if the input does not parse.
pub fn canonicalize(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Micros, true))
}
