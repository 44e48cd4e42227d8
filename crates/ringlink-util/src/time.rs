//! Time utilities for ringlink
//!
//! Every calendar date the bridge asks the upstream API about is a *local*
//! date. Using UTC here would shift "today" by a day for users far from
//! Greenwich around midnight.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `RINGLINK_MOCK_TIME` environment variable can be set
//! to override the system time for all date-sensitive operations. This is
//! useful for exercising day rollover and cache freshness.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 23:59:30`)
//!
//! Example:
//! ```bash
//! RINGLINK_MOCK_TIME="2025-12-25 23:59:30" ringlinkd
//! ```

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::sync::OnceLock;

#[cfg(debug_assertions)]
use chrono::NaiveDateTime;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "RINGLINK_MOCK_TIME";

/// Calendar date format used on the wire (`start_date`/`end_date`, `day`)
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Offset between mock time and real time, computed once at process start.
/// Mock time keeps advancing at the real rate.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// The "today"/"yesterday" pair for one instant, both as local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPair {
    pub today: NaiveDate,
    pub yesterday: NaiveDate,
}

impl DayPair {
    /// Resolve the local calendar days for a given instant
    pub fn at(instant: DateTime<Local>) -> Self {
        let today = instant.date_naive();
        // pred_opt only fails at NaiveDate::MIN
        let yesterday = today.pred_opt().unwrap_or(today);
        Self { today, yesterday }
    }

    /// Resolve the local calendar days for the current time
    pub fn current() -> Self {
        Self::at(now())
    }
}

/// Today's local calendar date
pub fn today() -> NaiveDate {
    DayPair::current().today
}

/// Yesterday's local calendar date
pub fn yesterday() -> NaiveDate {
    DayPair::current().yesterday
}

/// Format a date as a zero-padded `YYYY-MM-DD` string
pub fn day_string(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` string
pub fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DAY_FORMAT).ok()
}

/// `day` shifted back by `days` calendar days (saturating at the minimum date)
pub fn days_before(day: NaiveDate, days: u32) -> NaiveDate {
    day.checked_sub_days(chrono::Days::new(days as u64))
        .unwrap_or(NaiveDate::MIN)
}

/// Milliseconds since the Unix epoch, the representation used for persisted
/// token expiry and last-update stamps.
pub fn epoch_millis(dt: &DateTime<Local>) -> i64 {
    dt.timestamp_millis()
}

/// Inverse of [`epoch_millis`]
pub fn from_epoch_millis(ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(ms).single()
}

/// Format a DateTime for log output with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_day_pair_midnight_boundary() {
        let late = Local.with_ymd_and_hms(2025, 3, 1, 23, 59, 59).unwrap();
        let pair = DayPair::at(late);
        assert_eq!(pair.today, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(pair.yesterday, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());

        let early = Local.with_ymd_and_hms(2025, 3, 2, 0, 0, 1).unwrap();
        let pair = DayPair::at(early);
        assert_eq!(pair.today, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_eq!(pair.yesterday, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[test]
    fn test_day_pair_year_boundary() {
        let new_year = Local.with_ymd_and_hms(2026, 1, 1, 0, 30, 0).unwrap();
        let pair = DayPair::at(new_year);
        assert_eq!(day_string(pair.yesterday), "2025-12-31");
    }

    #[test]
    fn test_day_string_zero_padded() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert_eq!(day_string(d), "2025-01-05");
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(
            parse_day("2025-07-04"),
            NaiveDate::from_ymd_opt(2025, 7, 4)
        );
        assert_eq!(parse_day(" 2025-07-04 "), NaiveDate::from_ymd_opt(2025, 7, 4));
        assert!(parse_day("2025/07/04").is_none());
        assert!(parse_day("").is_none());
    }

    #[test]
    fn test_days_before() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        assert_eq!(days_before(d, 3), NaiveDate::from_ymd_opt(2025, 2, 27).unwrap());
        assert_eq!(days_before(d, 0), d);
    }

    #[test]
    fn test_epoch_millis_roundtrip() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 45).unwrap();
        let ms = epoch_millis(&dt);
        assert_eq!(from_epoch_millis(ms), Some(dt));
    }

    #[test]
    fn test_format_datetime_full() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 45).unwrap();
        assert_eq!(format_datetime_full(&dt), "2025-12-25 14:30:45");
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn test_today_is_local() {
        // today() must agree with the local date of now(), not the UTC date
        assert_eq!(today(), now().date_naive());
        assert_eq!(yesterday(), today().pred_opt().unwrap());
    }

    #[test]
    fn test_mock_time_env_var_name() {
        assert_eq!(MOCK_TIME_ENV_VAR, "RINGLINK_MOCK_TIME");
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_is_mock_time_active_in_debug() {
        // OnceLock makes the env var uncontrollable per test; just make sure it doesn't panic
        let _ = is_mock_time_active();
    }
}
