//! Time utilities for cadence
//!
//! Everything session-related is computed in the athlete's local wall-clock
//! time, never UTC: a session on date D from 21:00 to 23:00 must stay on D
//! regardless of the host's UTC offset.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `CADENCE_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is useful
//! for exercising check-in windows and the maintenance sweep by hand.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! CADENCE_MOCK_TIME="2025-12-25 14:30:00" cadenced sweep
//! ```

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "CADENCE_MOCK_TIME";

/// Format used for mock time and full datetime display
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

/// Initialize the mock time offset based on the environment variable.
#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, DATETIME_FORMAT) {
                    Ok(naive_dt) => match Local.from_local_datetime(&naive_dt).single() {
                        Some(mock_dt) => {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        None => {
                            tracing::warn!(
                                mock_time = %mock_time_str,
                                "Failed to convert mock time to local timezone"
                            );
                        }
                    },
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = DATETIME_FORMAT,
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

/// Today's date in local wall-clock time.
pub fn today() -> NaiveDate {
    now().date_naive()
}

/// Time of day for session templates and sessions, minute precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn to_naive_time(self) -> NaiveTime {
        // hour/minute are range-checked on construction
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Returns seconds since midnight
    pub fn as_seconds_from_midnight(&self) -> u32 {
        (self.hour as u32) * 3600 + (self.minute as u32) * 60
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_seconds_from_midnight()
            .cmp(&other.as_seconds_from_midnight())
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Error returned when a `HH:MM` string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWallClockError(pub String);

impl fmt::Display for ParseWallClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseWallClockError {}

impl FromStr for WallClock {
    type Err = ParseWallClockError;

    /// Accepts `HH:MM`, and `HH:MM:00` as written by SQL time columns.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(ParseWallClockError(format!("expected HH:MM, got '{}'", s)));
        }
        let hour: u8 = parts[0]
            .parse()
            .map_err(|_| ParseWallClockError(format!("invalid hour in '{}'", s)))?;
        let minute: u8 = parts[1]
            .parse()
            .map_err(|_| ParseWallClockError(format!("invalid minute in '{}'", s)))?;
        if parts.len() == 3 && parts[2] != "00" {
            return Err(ParseWallClockError(format!(
                "seconds are not supported in '{}'",
                s
            )));
        }
        WallClock::new(hour, minute)
            .ok_or_else(|| ParseWallClockError(format!("time out of range: '{}'", s)))
    }
}

impl TryFrom<String> for WallClock {
    type Error = ParseWallClockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WallClock> for String {
    fn from(value: WallClock) -> Self {
        value.to_string()
    }
}

/// Day of week as stored on templates: 0 = Sunday through 6 = Saturday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    pub const SUNDAY: DayOfWeek = DayOfWeek(0);
    pub const MONDAY: DayOfWeek = DayOfWeek(1);
    pub const TUESDAY: DayOfWeek = DayOfWeek(2);
    pub const WEDNESDAY: DayOfWeek = DayOfWeek(3);
    pub const THURSDAY: DayOfWeek = DayOfWeek(4);
    pub const FRIDAY: DayOfWeek = DayOfWeek(5);
    pub const SATURDAY: DayOfWeek = DayOfWeek(6);

    pub fn new(day: u8) -> Option<Self> {
        (day <= 6).then_some(Self(day))
    }

    pub fn of(date: NaiveDate) -> Self {
        Self(date.weekday().num_days_from_sunday() as u8)
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        Self::of(date) == *self
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DayOfWeek {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        DayOfWeek::new(value).ok_or_else(|| format!("day of week must be 0-6, got {}", value))
    }
}

impl From<DayOfWeek> for u8 {
    fn from(value: DayOfWeek) -> Self {
        value.0
    }
}

/// Resolved local start/end of one dated session
///
/// When the end clock time is not after the start, the session runs past
/// midnight and ends on the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SessionWindow {
    pub fn resolve(date: NaiveDate, start: WallClock, end: WallClock) -> Self {
        let start_dt = date.and_time(start.to_naive_time());
        let end_date = if end <= start {
            date.succ_opt().unwrap_or(date)
        } else {
            date
        };
        Self {
            start: start_dt,
            end: end_date.and_time(end.to_naive_time()),
        }
    }

    /// Moment the check-in window opens for the given lead time
    pub fn checkin_opens(&self, lead: Duration) -> NaiveDateTime {
        self.start - lead
    }

    /// Half-open `[start, end)`: the end instant already counts as past.
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        t >= self.start && t < self.end
    }

    pub fn has_ended(&self, t: NaiveDateTime) -> bool {
        t >= self.end
    }
}

/// Iterate every date in `[start, end]` inclusive.
pub fn dates_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// Whole calendar days from `earlier` to `later` (negative if reversed).
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}
