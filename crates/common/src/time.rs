use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. Returns 0 if the clock is before 1970.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Convert a protocol timestamp in seconds to milliseconds.
pub fn secs_to_ms(secs: i64) -> i64 {
    secs.saturating_mul(1000)
}
