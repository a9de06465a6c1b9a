use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Wall-clock label shown next to a message, `HH:mm` in `tz`.
pub fn clock_label<Tz>(timestamp: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    timestamp.with_timezone(tz).format("%H:%M").to_string()
}

/// `mm:ss` label for playback position and duration. Minutes are not wrapped into hours.
pub fn playback_label(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub fn recording_label(elapsed: Duration) -> String {
    format!("{}s", elapsed.as_secs())
}
