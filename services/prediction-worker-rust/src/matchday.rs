//! D+1 / visibility range calculator.
//!
//! A cycle opening on civil day D sells predictions for the matchday D+1.
//! The matchday is a 24h civil day in the window's offset that may begin at a
//! later wall-clock minute (soccer uses noon so late European kickoffs that
//! run past WIB midnight stay on one matchday).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::league::League;
use crate::window::{civil_midnight, Cycle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchdayRule {
    /// Days between the cycle date and the matchday (1 for D+1)
    pub day_offset: i64,
    /// Civil minute-of-day at which the matchday begins
    pub day_start_minute: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Matchday {
    pub league: League,
    pub for_date: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Matchday {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.starts_at <= instant && instant < self.ends_at
    }
}

/// Matchday served by a given cycle
pub fn matchday_for_cycle(cycle: &Cycle, rule: MatchdayRule, offset_minutes: i32) -> Matchday {
    let for_date = cycle.date + Duration::days(rule.day_offset);
    let starts_at = civil_midnight(for_date, offset_minutes) + Duration::minutes(i64::from(rule.day_start_minute));

    Matchday {
        league: cycle.league,
        for_date,
        starts_at,
        ends_at: starts_at + Duration::days(1),
    }
}

/// Matchday eligible for selection and sale at `now`
pub fn matchday_at(league: League, now: DateTime<Utc>) -> Matchday {
    let schedule = league.schedule();
    let cycle = schedule.window.current_cycle(now);
    matchday_for_cycle(&cycle, schedule.matchday, schedule.window.civil_offset_minutes)
}

/// Matchday of the most recently closed cycle
pub fn closed_matchday_at(league: League, now: DateTime<Utc>) -> (Cycle, Matchday) {
    let schedule = league.schedule();
    let cycle = schedule.window.last_closed_cycle(now);
    let matchday = matchday_for_cycle(&cycle, schedule.matchday, schedule.window.civil_offset_minutes);
    (cycle, matchday)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn nba_matchday_is_the_next_wib_day() {
        // 02:00 UTC = 09:00 WIB on the 16th, before the 12:00 WIB opening
        let md = matchday_at(League::Nba, at(2026, 10, 16, 2, 0));
        assert_eq!(md.for_date, date(2026, 10, 17));
        // 00:00 WIB on the 17th
        assert_eq!(md.starts_at, at(2026, 10, 16, 17, 0));
        assert_eq!(md.ends_at, at(2026, 10, 17, 17, 0));
    }

    #[test]
    fn nba_matchday_holds_through_the_open_window() {
        let before = matchday_at(League::Nba, at(2026, 10, 16, 4, 0));
        let during = matchday_at(League::Nba, at(2026, 10, 16, 20, 0));
        assert_eq!(before, during);
    }

    #[test]
    fn soccer_matchday_starts_at_wib_noon() {
        // 12:00 UTC on the 16th is between EPL close (11:00) and open (13:00)
        let md = matchday_at(League::Epl, at(2026, 10, 16, 12, 0));
        assert_eq!(md.for_date, date(2026, 10, 17));
        assert_eq!(md.starts_at, at(2026, 10, 17, 5, 0));
        // A 20:00 UK kickoff lands at 02:00 WIB the following day but in range
        assert!(md.contains(at(2026, 10, 17, 19, 0)));
        assert!(!md.contains(md.ends_at));
    }

    #[test]
    fn calculation_is_idempotent() {
        let now = at(2026, 12, 31, 23, 59);
        for league in League::ALL {
            assert_eq!(matchday_at(league, now), matchday_at(league, now));
        }
    }

    #[test]
    fn closed_matchday_trails_the_current_one() {
        let now = at(2026, 10, 16, 23, 30);
        let (cycle, md) = closed_matchday_at(League::Nba, now);
        assert_eq!(cycle.closes_at, at(2026, 10, 16, 23, 0));
        assert_eq!(md.for_date, date(2026, 10, 17));
        assert_eq!(matchday_at(League::Nba, now).for_date, date(2026, 10, 18));
    }
}
