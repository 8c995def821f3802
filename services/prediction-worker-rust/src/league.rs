//! Supported leagues and their fixed daily schedule.
//!
//! Every league shares the same lifecycle; the only things that differ are the
//! purchase window band, the matchday boundary and the sports API key. They all
//! live in one table here instead of one copy of the scheduling code per league.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::matchday::MatchdayRule;
use crate::window::{Window, WIB_OFFSET_MINUTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Nba,
    Epl,
    Laliga,
}

impl League {
    pub const ALL: [League; 3] = [League::Nba, League::Epl, League::Laliga];

    pub fn slug(self) -> &'static str {
        match self {
            League::Nba => "nba",
            League::Epl => "epl",
            League::Laliga => "laliga",
        }
    }

    /// Sport key used by The Odds API
    pub fn sport_key(self) -> &'static str {
        match self {
            League::Nba => "basketball_nba",
            League::Epl => "soccer_epl",
            League::Laliga => "soccer_spain_la_liga",
        }
    }

    /// Soccer matches can end level; basketball cannot.
    pub fn allows_draw(self) -> bool {
        !matches!(self, League::Nba)
    }

    pub fn schedule(self) -> LeagueSchedule {
        // Window bands are UTC minute-of-day; comments give the WIB wall clock.
        let (opens, closes, day_start) = match self {
            // 12:00 WIB -> 06:00 WIB next day, matchday starts 00:00 WIB
            League::Nba => (5 * 60, 23 * 60, 0),
            // 20:00 WIB -> 18:00 WIB next day, matchday starts 12:00 WIB
            League::Epl => (13 * 60, 11 * 60, 12 * 60),
            // 21:00 WIB -> 18:00 WIB next day, matchday starts 12:00 WIB
            League::Laliga => (14 * 60, 11 * 60, 12 * 60),
        };

        LeagueSchedule {
            window: Window {
                league: self,
                opens_at_utc_minute: opens,
                closes_at_utc_minute: closes,
                civil_offset_minutes: WIB_OFFSET_MINUTES,
            },
            matchday: MatchdayRule {
                day_offset: 1,
                day_start_minute: day_start,
            },
        }
    }

    pub fn window(self) -> Window {
        self.schedule().window
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for League {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nba" => Ok(League::Nba),
            "epl" | "premier-league" => Ok(League::Epl),
            "laliga" | "la-liga" => Ok(League::Laliga),
            other => Err(AppError::UnknownLeague(other.to_string())),
        }
    }
}

/// Window band plus matchday rule for one league
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeagueSchedule {
    pub window: Window,
    pub matchday: MatchdayRule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slugs_case_insensitively() {
        assert_eq!("NBA".parse::<League>().unwrap(), League::Nba);
        assert_eq!("la-liga".parse::<League>().unwrap(), League::Laliga);
        assert!(matches!(
            "mlb".parse::<League>(),
            Err(AppError::UnknownLeague(s)) if s == "mlb"
        ));
    }

    #[test]
    fn every_schedule_is_a_valid_window() {
        for league in League::ALL {
            let w = league.window();
            assert!(
                Window::new(
                    league,
                    w.opens_at_utc_minute,
                    w.closes_at_utc_minute,
                    w.civil_offset_minutes
                )
                .is_ok(),
                "{} window rejected",
                league
            );
        }
    }

    #[test]
    fn serde_uses_slugs() {
        assert_eq!(serde_json::to_string(&League::Laliga).unwrap(), "\"laliga\"");
    }
}
