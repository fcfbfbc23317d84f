//! Display formatting for captured records.

use chrono::{DateTime, Local, TimeZone};

/// Local wall-clock time of a millisecond timestamp as `HH:MM:SS.mmm`.
pub fn format_time(timestamp_ms: u64) -> String {
    format_time_in(timestamp_ms, &Local)
}

/// Wall-clock time of a millisecond timestamp in `zone`. Empty when the
/// timestamp is out of range.
pub fn format_time_in<Tz>(timestamp_ms: u64, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.with_timezone(zone).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_default()
}

/// Human-readable byte count with two decimals, up to GB.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// `<n>ms` below one second, otherwise seconds with two decimals.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_format_time_in_zone() {
        assert_eq!(format_time_in(0, &Utc), "00:00:00.000");
        // 2024-01-01T13:04:05.007Z
        assert_eq!(format_time_in(1_704_114_245_007, &Utc), "13:04:05.007");
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(format_time_in(1_704_114_245_007, &plus_two), "15:04:05.007");
        assert_eq!(format_time_in(u64::MAX, &Utc), "");
    }

    #[test]
    fn test_format_time_uses_local_zone() {
        let ms = 1_704_114_245_007;
        assert_eq!(format_time(ms), format_time_in(ms, &Local));
        assert!(format_time(ms).ends_with(":05.007"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 * 1024), "3072.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0ms");
        assert_eq!(format_duration(999), "999ms");
        assert_eq!(format_duration(1234), "1.23s");
    }
}
