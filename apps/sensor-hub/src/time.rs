use chrono::{DateTime, Utc};

/// Current wall-clock time truncated to whole milliseconds, the precision
/// readings are stored and served with.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
