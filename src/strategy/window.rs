//! Session-local time windows.
//!
//! A window is configured as start/end hour-minute pairs in the session
//! time zone. When the end is not after the start the window wraps past
//! midnight and ends on the following calendar day (e.g. 20:00–02:30).
//! The trading session and the range capture window both go through
//! [`WindowSpec::window_on`].

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::types::BotError;

/// Hour/minute boundaries of a local-time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WindowSpec {
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
}

/// Concrete local-time boundaries for one calendar cycle. `end > start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl TimeWindow {
    /// Inclusive at both ends.
    pub fn contains(&self, t: &DateTime<Tz>) -> bool {
        self.start <= *t && *t <= self.end
    }

    /// Half-open `[start, end)`.
    pub fn contains_half_open(&self, t: &DateTime<Tz>) -> bool {
        self.start <= *t && *t < self.end
    }
}

impl WindowSpec {
    pub fn new(start_hour: u32, start_minute: u32, end_hour: u32, end_minute: u32) -> Self {
        Self {
            start_hour,
            start_minute,
            end_hour,
            end_minute,
        }
    }

    /// Reject hours outside 0..24 and minutes outside 0..60.
    pub fn validate(&self) -> Result<(), BotError> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(BotError::Config(format!(
                "window hours must be 0-23, got {}..{}",
                self.start_hour, self.end_hour
            )));
        }
        if self.start_minute > 59 || self.end_minute > 59 {
            return Err(BotError::Config(format!(
                "window minutes must be 0-59, got {}..{}",
                self.start_minute, self.end_minute
            )));
        }
        Ok(())
    }

    /// Whether the window wraps past local midnight.
    pub fn crosses_midnight(&self) -> bool {
        (self.end_hour, self.end_minute) <= (self.start_hour, self.start_minute)
    }

    /// Build the window starting on local calendar day `date`.
    pub fn window_on(&self, date: NaiveDate, tz: Tz) -> Result<TimeWindow, BotError> {
        let start = local_at(tz, date, self.start_hour, self.start_minute)?;
        let end_date = if self.crosses_midnight() {
            date + Duration::days(1)
        } else {
            date
        };
        let end = local_at(tz, end_date, self.end_hour, self.end_minute)?;
        Ok(TimeWindow { start, end })
    }

    /// The window relevant to `now_utc`.
    ///
    /// Built on the local date of `now`; when `now` is before that start
    /// but still inside the window that began the previous day, the
    /// previous day's window is returned instead.
    pub fn session_window(&self, now_utc: DateTime<Utc>, tz: Tz) -> Result<TimeWindow, BotError> {
        let now = now_utc.with_timezone(&tz);
        let today = self.window_on(now.date_naive(), tz)?;
        if now < today.start {
            if let Some(prev_date) = now.date_naive().pred_opt() {
                let yesterday = self.window_on(prev_date, tz)?;
                if yesterday.contains(&now) {
                    return Ok(yesterday);
                }
            }
        }
        Ok(today)
    }

    /// `start <= now <= end` for the window from [`Self::session_window`].
    pub fn in_session(&self, now_utc: DateTime<Utc>, tz: Tz) -> Result<bool, BotError> {
        let window = self.session_window(now_utc, tz)?;
        Ok(window.contains(&now_utc.with_timezone(&tz)))
    }
}

/// Resolve a local wall-clock time. Ambiguous times take the earlier
/// instant; times inside a DST gap move to the first instant after it.
fn local_at(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> Result<DateTime<Tz>, BotError> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| BotError::Config(format!("invalid local time {hour:02}:{minute:02}")))?;
    let naive = NaiveDateTime::new(date, time);
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return Ok(dt);
    }
    // Gaps are at most an hour in the zones we trade; step past it.
    let shifted = naive + Duration::hours(1);
    tz.from_local_datetime(&shifted)
        .earliest()
        .ok_or_else(|| BotError::Config(format!("local time {naive} does not exist in {tz}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
