//! Window Clock: daily purchase windows and their cycles.
//!
//! All arithmetic is done on UTC instants with a fixed civil offset (WIB);
//! the host timezone is never consulted.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::league::League;

/// WIB, UTC+7
pub const WIB_OFFSET_MINUTES: i32 = 7 * 60;

pub const MINUTES_PER_DAY: i32 = 24 * 60;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("minute-of-day {0} is outside 0..1440")]
    MinuteOutOfRange(i32),

    #[error("window opens and closes at the same minute ({0})")]
    EmptyWindow(i32),

    #[error("civil offset of {0} minutes is a day or more")]
    OffsetOutOfRange(i32),
}

/// A recurring daily band, in UTC minutes-of-day. May span midnight UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub league: League,
    pub opens_at_utc_minute: i32,
    pub closes_at_utc_minute: i32,
    pub civil_offset_minutes: i32,
}

/// Output of the Window Clock for one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowStatus {
    pub league: League,
    pub is_open: bool,
    pub minutes_until_next_transition: i64,
    pub next_transition_is_open: bool,
    pub next_transition_at: DateTime<Utc>,
}

/// One occurrence of a league's window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cycle {
    pub league: League,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    /// Civil date (in the window's offset) on which the window opens, day D
    pub date: NaiveDate,
}

impl Cycle {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.opens_at <= instant && instant < self.closes_at
    }
}

impl Window {
    pub fn new(
        league: League,
        opens_at_utc_minute: i32,
        closes_at_utc_minute: i32,
        civil_offset_minutes: i32,
    ) -> Result<Self, WindowError> {
        for minute in [opens_at_utc_minute, closes_at_utc_minute] {
            if !(0..MINUTES_PER_DAY).contains(&minute) {
                return Err(WindowError::MinuteOutOfRange(minute));
            }
        }
        if opens_at_utc_minute == closes_at_utc_minute {
            return Err(WindowError::EmptyWindow(opens_at_utc_minute));
        }
        if civil_offset_minutes.abs() >= MINUTES_PER_DAY {
            return Err(WindowError::OffsetOutOfRange(civil_offset_minutes));
        }

        Ok(Self {
            league,
            opens_at_utc_minute,
            closes_at_utc_minute,
            civil_offset_minutes,
        })
    }

    fn open_secs(&self) -> i64 {
        i64::from(self.opens_at_utc_minute) * 60
    }

    fn close_secs(&self) -> i64 {
        i64::from(self.closes_at_utc_minute) * 60
    }

    /// Length of one open band
    pub fn duration(&self) -> Duration {
        let minutes = (self.closes_at_utc_minute - self.opens_at_utc_minute).rem_euclid(MINUTES_PER_DAY);
        Duration::minutes(i64::from(minutes))
    }

    pub fn spans_midnight_utc(&self) -> bool {
        self.closes_at_utc_minute < self.opens_at_utc_minute
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let t = i64::from(now.num_seconds_from_midnight());
        let (open, close) = (self.open_secs(), self.close_secs());
        if open < close {
            open <= t && t < close
        } else {
            t >= open || t < close
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> WindowStatus {
        let is_open = self.is_open(now);
        let next_transition_at = if is_open {
            self.closes_at(self.last_opening(now))
        } else {
            self.next_opening(now)
        };

        // Round partial minutes up so a pending transition never reads as 0.
        // The transition is less than a day away, so nanoseconds cannot overflow.
        const NANOS_PER_MINUTE: i64 = 60_000_000_000;
        let nanos = (next_transition_at - now)
            .num_nanoseconds()
            .unwrap_or(i64::MAX - NANOS_PER_MINUTE)
            .max(0);
        let minutes_until_next_transition = (nanos + NANOS_PER_MINUTE - 1) / NANOS_PER_MINUTE;

        WindowStatus {
            league: self.league,
            is_open,
            minutes_until_next_transition,
            next_transition_is_open: !is_open,
            next_transition_at,
        }
    }

    /// Most recent opening at or before `now`
    pub fn last_opening(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let candidate = utc_midnight(now) + Duration::seconds(self.open_secs());
        if candidate > now {
            candidate - Duration::seconds(SECONDS_PER_DAY)
        } else {
            candidate
        }
    }

    /// First opening strictly after `now`
    pub fn next_opening(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.last_opening(now) + Duration::seconds(SECONDS_PER_DAY)
    }

    pub fn closes_at(&self, opening: DateTime<Utc>) -> DateTime<Utc> {
        opening + self.duration()
    }

    pub fn cycle_at(&self, opening: DateTime<Utc>) -> Cycle {
        Cycle {
            league: self.league,
            opens_at: opening,
            closes_at: self.closes_at(opening),
            date: civil_date(opening, self.civil_offset_minutes),
        }
    }

    /// The open cycle, or the upcoming one while the window is closed
    pub fn current_cycle(&self, now: DateTime<Utc>) -> Cycle {
        let last = self.cycle_at(self.last_opening(now));
        if last.contains(now) {
            last
        } else {
            self.cycle_at(self.next_opening(now))
        }
    }

    /// Most recent cycle whose window has already closed
    pub fn last_closed_cycle(&self, now: DateTime<Utc>) -> Cycle {
        let last = self.cycle_at(self.last_opening(now));
        if last.closes_at <= now {
            last
        } else {
            self.cycle_at(last.opens_at - Duration::seconds(SECONDS_PER_DAY))
        }
    }
}

/// Civil calendar date of `instant` in a fixed offset from UTC
pub fn civil_date(instant: DateTime<Utc>, offset_minutes: i32) -> NaiveDate {
    (instant + Duration::minutes(i64::from(offset_minutes))).date_naive()
}

/// UTC instant at which `date` begins in a fixed offset from UTC
pub fn civil_midnight(date: NaiveDate, offset_minutes: i32) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc() - Duration::minutes(i64::from(offset_minutes))
}

fn utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}
