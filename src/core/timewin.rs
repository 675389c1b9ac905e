//! Wall-clock arithmetic for the wake window.
//!
//! Wake times are configured as a local time of day (`"HH:MM"`) and resolved
//! to the next absolute occurrence, rolling over to tomorrow when the time
//! has already passed. All values are naive local date-times; callers pass
//! the current local time in.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

/// Hour used when a wake-time string cannot be parsed.
pub const DEFAULT_WAKE_HOUR: u32 = 7;

/// Length of one sleep cycle in minutes.
pub const SLEEP_CYCLE_MINUTES: i64 = 90;

/// Outcome of resolving a `"HH:MM"` wake-time string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeTimeParse {
    /// The string was valid; this is its next occurrence.
    Parsed(NaiveDateTime),
    /// The string was malformed; 07:00 tomorrow was substituted.
    Defaulted { at: NaiveDateTime, input: String },
}

impl WakeTimeParse {
    /// The resolved wake time, whichever way it was obtained.
    pub fn at(&self) -> NaiveDateTime {
        match self {
            WakeTimeParse::Parsed(at) => *at,
            WakeTimeParse::Defaulted { at, .. } => *at,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, WakeTimeParse::Defaulted { .. })
    }
}

/// Parse a 24-hour `"HH:MM"` time of day.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let (hour, minute) = s.trim().split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Next occurrence of `time` strictly after `now`.
pub fn next_occurrence(time: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(time);
    if today <= now {
        today + Duration::days(1)
    } else {
        today
    }
}

/// 07:00 on the day after `now`.
pub fn default_wake_time(now: NaiveDateTime) -> NaiveDateTime {
    let seven = NaiveTime::from_hms_opt(DEFAULT_WAKE_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    now.date().and_time(seven) + Duration::days(1)
}

/// Resolve a wake-time string relative to `now`.
///
/// Never fails: malformed input yields [`WakeTimeParse::Defaulted`] and it is
/// up to the caller to report the substitution.
pub fn parse_wake_time(s: &str, now: NaiveDateTime) -> WakeTimeParse {
    match parse_time_of_day(s) {
        Some(time) => WakeTimeParse::Parsed(next_occurrence(time, now)),
        None => WakeTimeParse::Defaulted {
            at: default_wake_time(now),
            input: s.to_string(),
        },
    }
}

/// The closed interval `[wake_time - window, wake_time]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WakeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl WakeWindow {
    pub fn ending_at(wake_time: NaiveDateTime, window_minutes: u32) -> Self {
        Self {
            start: wake_time - Duration::minutes(i64::from(window_minutes)),
            end: wake_time,
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Whole minutes from `start` to `end`, truncated toward zero.
pub fn minutes_between(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    (end - start).num_minutes()
}

/// Night is 21:00 through 08:59.
pub fn is_night_time<T: Timelike>(t: &T) -> bool {
    let hour = t.hour();
    hour >= 21 || hour < 9
}

/// Start of each 90-minute cycle within `duration_minutes` of sleep.
pub fn sleep_cycle_times(start: NaiveDateTime, duration_minutes: u32) -> Vec<NaiveDateTime> {
    (0..i64::from(duration_minutes))
        .step_by(SLEEP_CYCLE_MINUTES as usize)
        .map(|offset| start + Duration::minutes(offset))
        .collect()
}

/// Cycle boundaries (up to five cycles) that fall between `min_hours` and
/// `max_hours` after `sleep_start`, sorted and without duplicates.
pub fn optimal_wake_times(
    sleep_start: NaiveDateTime,
    min_hours: u32,
    max_hours: u32,
) -> Vec<NaiveDateTime> {
    let earliest = sleep_start + Duration::hours(i64::from(min_hours));
    let latest = sleep_start + Duration::hours(i64::from(max_hours));

    (1..=5)
        .map(|cycle| sleep_start + Duration::minutes(cycle * SLEEP_CYCLE_MINUTES))
        .filter(|t| *t >= earliest && *t <= latest)
        .collect()
}
