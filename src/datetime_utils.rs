use chrono::{DateTime, Utc};

/// Common date/time formats used throughout the application
pub mod formats {
    /// Format for filenames with separator: "20240120_153000"
    pub const FILENAME_WITH_SEPARATOR: &str = "%Y%m%d_%H%M%S";

    /// Human-readable format for display: "2024-01-20 15:30:00"
    pub const DISPLAY_FULL: &str = "%Y-%m-%d %H:%M:%S";
}

/// Format a datetime for use in filenames with separator
pub fn format_for_filename(datetime: &DateTime<Utc>) -> String {
    datetime
        .format(formats::FILENAME_WITH_SEPARATOR)
        .to_string()
}

/// Format a datetime for human-readable display
pub fn format_for_display(datetime: &DateTime<Utc>) -> String {
    datetime.format(formats::DISPLAY_FULL).to_string()
}

/// Get current UTC timestamp
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Name of the per-run log file, e.g. "view_log_20240120_153000.log"
pub fn run_log_filename(started_at: &DateTime<Utc>) -> String {
    format!("view_log_{}.log", format_for_filename(started_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_for_filename() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 20, 15, 30, 0).unwrap();
        assert_eq!(format_for_filename(&dt), "20240120_153000");
    }

    #[test]
    fn test_format_for_display() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 20, 15, 30, 0).unwrap();
        assert_eq!(format_for_display(&dt), "2024-01-20 15:30:00");
    }

    #[test]
    fn test_run_log_filename() {
        let dt = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(run_log_filename(&dt), "view_log_20241231_235959.log");
    }
}
