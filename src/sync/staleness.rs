use chrono::{DateTime, SubsecRound, Utc};

/// UTC, whole seconds.
pub fn normalize(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(0)
}

/// A local copy is stale when it is missing or its timestamp names a different second.
pub fn is_stale(existing: Option<DateTime<Utc>>, incoming: DateTime<Utc>) -> bool {
    match existing {
        Some(existing) => normalize(existing) != normalize(incoming),
        None => true,
    }
}

/// The `updated_since` form: `2024-03-01T12:30:05Z`.
pub fn to_iso(ts: DateTime<Utc>) -> String {
    normalize(ts).format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse an RFC 3339 timestamp with any offset into UTC.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
