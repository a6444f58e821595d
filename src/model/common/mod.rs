//! Rules shared by every surface: who may do what, and when.

pub mod access;
pub mod lifecycle;

use chrono::{DateTime, Timelike, Utc};

/// Truncate to millisecond precision, which is all the database stores.
/// Timestamps are truncated before use so the in-memory value always equals
/// the stored one.
pub fn timestamp(time: DateTime<Utc>) -> DateTime<Utc> {
    let millis = time.nanosecond() / 1_000_000 * 1_000_000;
    time.with_nanosecond(millis).unwrap_or(time)
}
