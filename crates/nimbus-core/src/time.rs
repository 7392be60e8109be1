//! Millisecond epoch time helpers.
//!
//! The store and the broker both keep time as `i64` epoch milliseconds;
//! the wire format uses RFC 3339. These helpers convert between the two.

use chrono::{DateTime, Utc};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Convert epoch milliseconds to a UTC datetime.
///
/// Values outside chrono's representable range clamp to the range
/// boundary instead of failing; every timestamp this pipeline produces
/// is well inside it.
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Convert a UTC datetime to epoch milliseconds.
pub fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}
