//! Per-cycle progress markers.
//!
//! The tracker answers "has this cycle already been selected / opened /
//! closed / raffled / archived" so every worker run can be repeated safely.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::league::League;
use crate::selection::cycle_key;
use crate::store::JsonStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pending,
    Selected,
    Predicted,
    Open,
    Closed,
    Raffled,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Milestone {
    Selected,
    Predicted,
    Opened,
    Closed,
    Raffled,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub league: League,
    pub for_date: NaiveDate,
    #[serde(default)]
    pub selected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub predicted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raffled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl CycleRecord {
    pub fn new(league: League, for_date: NaiveDate) -> Self {
        Self {
            league,
            for_date,
            selected_at: None,
            predicted_at: None,
            opened_at: None,
            closed_at: None,
            raffled_at: None,
            archived_at: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.archived_at.is_some() {
            Phase::Archived
        } else if self.raffled_at.is_some() {
            Phase::Raffled
        } else if self.closed_at.is_some() {
            Phase::Closed
        } else if self.opened_at.is_some() {
            Phase::Open
        } else if self.predicted_at.is_some() {
            Phase::Predicted
        } else if self.selected_at.is_some() {
            Phase::Selected
        } else {
            Phase::Pending
        }
    }

    pub fn reached(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        match milestone {
            Milestone::Selected => self.selected_at,
            Milestone::Predicted => self.predicted_at,
            Milestone::Opened => self.opened_at,
            Milestone::Closed => self.closed_at,
            Milestone::Raffled => self.raffled_at,
            Milestone::Archived => self.archived_at,
        }
    }

    fn slot(&mut self, milestone: Milestone) -> &mut Option<DateTime<Utc>> {
        match milestone {
            Milestone::Selected => &mut self.selected_at,
            Milestone::Predicted => &mut self.predicted_at,
            Milestone::Opened => &mut self.opened_at,
            Milestone::Closed => &mut self.closed_at,
            Milestone::Raffled => &mut self.raffled_at,
            Milestone::Archived => &mut self.archived_at,
        }
    }
}

pub struct CycleTracker {
    store: JsonStore<BTreeMap<String, CycleRecord>>,
}

impl CycleTracker {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            store: JsonStore::new(path.as_ref()),
        }
    }

    pub async fn get(&self, league: League, for_date: NaiveDate) -> CycleRecord {
        self.store
            .load()
            .await
            .remove(&cycle_key(league, for_date))
            .unwrap_or_else(|| CycleRecord::new(league, for_date))
    }

    /// Stamp `milestone` at `now`. Re-selection may restamp `selected_at`;
    /// every other milestone keeps its first timestamp.
    pub async fn mark(
        &self,
        league: League,
        for_date: NaiveDate,
        milestone: Milestone,
        now: DateTime<Utc>,
    ) -> Result<CycleRecord> {
        let key = cycle_key(league, for_date);
        self.store
            .update(|book| {
                let record = book
                    .entry(key)
                    .or_insert_with(|| CycleRecord::new(league, for_date));
                let slot = record.slot(milestone);
                if slot.is_none() || milestone == Milestone::Selected {
                    *slot = Some(now);
                }
                record.clone()
            })
            .await
    }
}
