//! Selection Lock: which fixtures were chosen for a league's matchday.
//!
//! Entries are kept as raw JSON values so that one corrupt record only hides
//! itself instead of the whole book.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::league::League;
use crate::sports_api::MatchRef;
use crate::store::JsonStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub league: League,
    pub for_date: NaiveDate,
    /// Ordered by kickoff
    pub match_ids: Vec<String>,
    #[serde(default)]
    pub matches: Vec<MatchRef>,
    pub locked_at: DateTime<Utc>,
}

impl Selection {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.locked_at
    }
}

pub type SelectionBook = BTreeMap<String, Value>;

pub fn cycle_key(league: League, for_date: NaiveDate) -> String {
    format!("{}:{}", league, for_date)
}

pub struct SelectionLock {
    store: JsonStore<SelectionBook>,
    max_age: Duration,
}

impl SelectionLock {
    pub fn new(path: impl AsRef<Path>, max_age: Duration) -> Self {
        Self {
            store: JsonStore::new(path.as_ref()),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Record the selection for `for_date`, replacing any previous one
    pub async fn lock(
        &self,
        league: League,
        for_date: NaiveDate,
        matches: Vec<MatchRef>,
        now: DateTime<Utc>,
    ) -> Result<Selection> {
        let selection = Selection {
            league,
            for_date,
            match_ids: matches.iter().map(|m| m.external_id.clone()).collect(),
            matches,
            locked_at: now,
        };

        let value = serde_json::to_value(&selection)?;
        self.store
            .update(|book| book.insert(cycle_key(league, for_date), value))
            .await?;

        info!(
            "Locked {} {} selection: {} matches",
            league,
            for_date,
            selection.match_ids.len()
        );
        Ok(selection)
    }

    /// Selection for `for_date` unless it is missing, unreadable or stale
    pub async fn get(&self, league: League, for_date: NaiveDate, now: DateTime<Utc>) -> Option<Selection> {
        self.peek(league, for_date)
            .await
            .filter(|selection| selection.age(now) <= self.max_age)
    }

    /// Stored selection regardless of age
    pub async fn peek(&self, league: League, for_date: NaiveDate) -> Option<Selection> {
        let book = self.store.load().await;
        let key = cycle_key(league, for_date);
        let raw = book.get(&key)?;

        let selection: Selection = match serde_json::from_value(raw.clone()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Ignoring malformed selection {}: {}", key, e);
                return None;
            }
        };

        if selection.league != league || selection.for_date != for_date {
            warn!("Ignoring selection filed under mismatched key {}", key);
            return None;
        }

        Some(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sports_api::MatchStatus;
    use chrono::TimeZone;

    fn fixture(id: &str) -> MatchRef {
        MatchRef {
            external_id: id.to_string(),
            home_team: "Arsenal".into(),
            away_team: "Chelsea".into(),
            start_instant: Utc.with_ymd_and_hms(2026, 10, 17, 14, 0, 0).unwrap(),
            status: MatchStatus::Scheduled,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[tokio::test]
    async fn lock_is_retrievable_until_threshold_then_expires() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SelectionLock::new(dir.path().join("selections.json"), Duration::hours(30));
        let t = Utc.with_ymd_and_hms(2026, 10, 16, 3, 0, 0).unwrap();

        let locked = lock
            .lock(League::Epl, date(), vec![fixture("b"), fixture("a")], t)
            .await
            .unwrap();
        assert_eq!(locked.match_ids, vec!["b", "a"]);

        let same = lock.get(League::Epl, date(), t).await;
        assert_eq!(same.as_ref(), Some(&locked));

        let at_threshold = lock.get(League::Epl, date(), t + Duration::hours(30)).await;
        assert_eq!(at_threshold, Some(locked));

        let after = t + Duration::hours(30) + Duration::seconds(1);
        assert_eq!(lock.get(League::Epl, date(), after).await, None);
    }

    #[tokio::test]
    async fn relock_overwrites_and_leagues_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SelectionLock::new(dir.path().join("selections.json"), Duration::hours(30));
        let t = Utc.with_ymd_and_hms(2026, 10, 16, 3, 0, 0).unwrap();

        lock.lock(League::Epl, date(), vec![fixture("a")], t).await.unwrap();
        lock.lock(League::Epl, date(), vec![fixture("c")], t + Duration::hours(1))
            .await
            .unwrap();

        let got = lock.get(League::Epl, date(), t + Duration::hours(2)).await.unwrap();
        assert_eq!(got.match_ids, vec!["c"]);
        assert!(lock.get(League::Laliga, date(), t).await.is_none());
    }

    #[tokio::test]
    async fn malformed_entry_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selections.json");
        std::fs::write(&path, r#"{"epl:2026-10-17": {"league": "epl", "match_ids": 7}}"#).unwrap();

        let lock = SelectionLock::new(&path, Duration::hours(30));
        let t = Utc.with_ymd_and_hms(2026, 10, 16, 3, 0, 0).unwrap();
        assert!(lock.get(League::Epl, date(), t).await.is_none());
    }
}
