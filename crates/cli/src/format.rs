//! 一覧表示用の整形

use chrono::{DateTime, Utc};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// バイト数を `B` / `KB` / `MB` で表す（KB・MBは小数点以下2桁）。
pub fn format_file_size(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    }
}

/// `now` から見た経過時間。7日以上前は日付を返す。
pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else {
        at.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1024), "1.00 KB");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(MIB - 1), "1024.00 KB");
        assert_eq!(format_file_size(MIB), "1.00 MB");
        assert_eq!(format_file_size(5 * MIB + MIB / 4), "5.25 MB");
    }

    #[test]
    fn test_format_relative_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();

        assert_eq!(format_relative_time(now, now), "Just now");
        assert_eq!(format_relative_time(now - Duration::seconds(59), now), "Just now");
        assert_eq!(format_relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_relative_time(now - Duration::minutes(59), now), "59m ago");
        assert_eq!(format_relative_time(now - Duration::minutes(60), now), "1h ago");
        assert_eq!(format_relative_time(now - Duration::hours(23), now), "23h ago");
        assert_eq!(format_relative_time(now - Duration::hours(24), now), "1d ago");
        assert_eq!(format_relative_time(now - Duration::days(6), now), "6d ago");
        assert_eq!(format_relative_time(now - Duration::days(7), now), "2024-03-08");
        // 時計のずれで未来の時刻になっても「たった今」
        assert_eq!(format_relative_time(now + Duration::minutes(3), now), "Just now");
    }
}
