//! Lifecycle workers: select, predict, open, close, raffle, archive.
//!
//! Each action is gated on the window clock and the cycle tracker and is safe
//! to repeat; a run that has nothing to do reports `skipped` with a reason.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::app::Services;
use crate::archive::CycleBundle;
use crate::cycle::Milestone;
use crate::error::AppError;
use crate::league::League;
use crate::matchday::{closed_matchday_at, matchday_for_cycle};
use crate::prediction::{self, PredictionSet};
use crate::raffle;
use crate::sports_api::{MatchRef, MatchStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerAction {
    Select,
    Predict,
    Open,
    Close,
    Raffle,
    Archive,
}

impl WorkerAction {
    /// Order used by the scheduler: finish the closed cycle, then prepare the next.
    pub const TICK_ORDER: [WorkerAction; 6] = [
        WorkerAction::Close,
        WorkerAction::Raffle,
        WorkerAction::Archive,
        WorkerAction::Select,
        WorkerAction::Predict,
        WorkerAction::Open,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerAction::Select => "select",
            WorkerAction::Predict => "predict",
            WorkerAction::Open => "open",
            WorkerAction::Close => "close",
            WorkerAction::Raffle => "raffle",
            WorkerAction::Archive => "archive",
        }
    }
}

impl fmt::Display for WorkerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(WorkerAction::Select),
            "predict" => Ok(WorkerAction::Predict),
            "open" => Ok(WorkerAction::Open),
            "close" => Ok(WorkerAction::Close),
            "raffle" => Ok(WorkerAction::Raffle),
            "archive" => Ok(WorkerAction::Archive),
            other => Err(AppError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Done,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub league: League,
    pub action: WorkerAction,
    pub for_date: NaiveDate,
    pub status: OutcomeStatus,
    pub detail: String,
}

impl WorkerOutcome {
    fn done(league: League, action: WorkerAction, for_date: NaiveDate, detail: impl Into<String>) -> Self {
        Self {
            league,
            action,
            for_date,
            status: OutcomeStatus::Done,
            detail: detail.into(),
        }
    }

    fn skipped(league: League, action: WorkerAction, for_date: NaiveDate, detail: impl Into<String>) -> Self {
        Self {
            league,
            action,
            for_date,
            status: OutcomeStatus::Skipped,
            detail: detail.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == OutcomeStatus::Done
    }
}

impl Services {
    pub async fn run_worker(
        &self,
        league: League,
        action: WorkerAction,
        now: DateTime<Utc>,
    ) -> Result<WorkerOutcome> {
        let outcome = match action {
            WorkerAction::Select => self.select(league, now).await?,
            WorkerAction::Predict => self.predict(league, now).await?,
            WorkerAction::Open => self.open(league, now).await?,
            WorkerAction::Close => self.close(league, now).await?,
            WorkerAction::Raffle => self.raffle(league, now).await?,
            WorkerAction::Archive => self.archive_cycle(league, now).await?,
        };

        if outcome.is_done() {
            info!("{} {} {}: {}", league, action, outcome.for_date, outcome.detail);
        }
        Ok(outcome)
    }

    async fn select(&self, league: League, now: DateTime<Utc>) -> Result<WorkerOutcome> {
        const ACTION: WorkerAction = WorkerAction::Select;
        let schedule = league.schedule();
        let cycle = schedule.window.current_cycle(now);
        let matchday = matchday_for_cycle(&cycle, schedule.matchday, schedule.window.civil_offset_minutes);
        let date = matchday.for_date;

        if cycle.contains(now) {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "window is open; selection is frozen"));
        }
        if let Some(existing) = self.selections.get(league, date, now).await {
            return Ok(WorkerOutcome::skipped(
                league,
                ACTION,
                date,
                format!("already selected {} matches", existing.match_ids.len()),
            ));
        }
        if self.predictions.get(league, date).await.is_some() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "predictions already published"));
        }

        let fixtures = self.sports.fetch_fixtures(league, &matchday, now).await?;
        let chosen: Vec<MatchRef> = fixtures
            .into_iter()
            .filter(|m| m.status == MatchStatus::Scheduled)
            .take(self.config.max_matches_per_cycle)
            .collect();

        if chosen.is_empty() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "no scheduled fixtures in range"));
        }

        let selection = self.selections.lock(league, date, chosen, now).await?;
        self.cycles.mark(league, date, Milestone::Selected, now).await?;

        Ok(WorkerOutcome::done(
            league,
            ACTION,
            date,
            format!("selected {}", selection.match_ids.join(",")),
        ))
    }

    async fn predict(&self, league: League, now: DateTime<Utc>) -> Result<WorkerOutcome> {
        const ACTION: WorkerAction = WorkerAction::Predict;
        let schedule = league.schedule();
        let cycle = schedule.window.current_cycle(now);
        let date = matchday_for_cycle(&cycle, schedule.matchday, schedule.window.civil_offset_minutes).for_date;

        if cycle.contains(now) {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "window is open; predictions are frozen"));
        }
        if self.predictions.get(league, date).await.is_some() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "predictions already generated"));
        }
        let Some(selection) = self.selections.get(league, date, now).await else {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "no active selection"));
        };

        let predictions = {
            let mut rng = StdRng::from_entropy();
            prediction::generate(league, date, &selection.matches, &mut rng)
        };
        let set = PredictionSet {
            generated_at: now,
            predictions,
        };

        let (kept, inserted) = self.predictions.insert_once(league, date, set).await?;
        if !inserted {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "predictions already generated"));
        }
        self.cycles.mark(league, date, Milestone::Predicted, now).await?;

        Ok(WorkerOutcome::done(
            league,
            ACTION,
            date,
            format!("generated {} predictions", kept.predictions.len()),
        ))
    }

    async fn open(&self, league: League, now: DateTime<Utc>) -> Result<WorkerOutcome> {
        const ACTION: WorkerAction = WorkerAction::Open;
        let schedule = league.schedule();
        let cycle = schedule.window.current_cycle(now);
        let date = matchday_for_cycle(&cycle, schedule.matchday, schedule.window.civil_offset_minutes).for_date;

        if !cycle.contains(now) {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "window is not open yet"));
        }
        if self.cycles.get(league, date).await.opened_at.is_some() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "already open"));
        }
        if self.predictions.get(league, date).await.is_none() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "no predictions to sell"));
        }

        self.cycles.mark(league, date, Milestone::Opened, now).await?;
        Ok(WorkerOutcome::done(
            league,
            ACTION,
            date,
            format!("sales open until {}", cycle.closes_at.to_rfc3339()),
        ))
    }

    async fn close(&self, league: League, now: DateTime<Utc>) -> Result<WorkerOutcome> {
        const ACTION: WorkerAction = WorkerAction::Close;
        let (_, matchday) = closed_matchday_at(league, now);
        let date = matchday.for_date;
        let record = self.cycles.get(league, date).await;

        if record.opened_at.is_none() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "cycle was never opened"));
        }
        if record.closed_at.is_some() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "already closed"));
        }

        let tickets = self.purchases.for_cycle(league, date).await?.len();
        self.cycles.mark(league, date, Milestone::Closed, now).await?;
        Ok(WorkerOutcome::done(
            league,
            ACTION,
            date,
            format!("sales closed with {} tickets", tickets),
        ))
    }

    async fn raffle(&self, league: League, now: DateTime<Utc>) -> Result<WorkerOutcome> {
        const ACTION: WorkerAction = WorkerAction::Raffle;
        let (_, matchday) = closed_matchday_at(league, now);
        let date = matchday.for_date;
        let record = self.cycles.get(league, date).await;

        if record.closed_at.is_none() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "sales not closed"));
        }
        if record.raffled_at.is_some() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "already drawn"));
        }

        let tickets = self.purchases.for_cycle(league, date).await?;
        let result = {
            let mut rng = StdRng::from_entropy();
            raffle::draw(league, date, &tickets, self.config.raffle_payout_percent, now, &mut rng)
        };
        let (kept, _) = self.raffles.record_once(result).await?;
        self.cycles.mark(league, date, Milestone::Raffled, now).await?;

        let detail = match &kept.winner {
            Some(w) => format!("{} wins {} of {}", w.buyer_id, kept.payout, kept.pool),
            None => "no tickets sold".to_string(),
        };
        Ok(WorkerOutcome::done(league, ACTION, date, detail))
    }

    async fn archive_cycle(&self, league: League, now: DateTime<Utc>) -> Result<WorkerOutcome> {
        const ACTION: WorkerAction = WorkerAction::Archive;
        let (_, matchday) = closed_matchday_at(league, now);
        let date = matchday.for_date;
        let mut record = self.cycles.get(league, date).await;

        if record.raffled_at.is_none() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "raffle not drawn"));
        }
        if record.archived_at.is_some() {
            return Ok(WorkerOutcome::skipped(league, ACTION, date, "already archived"));
        }

        record.archived_at = Some(now);
        let bundle = CycleBundle {
            league,
            for_date: date,
            cycle: record,
            selection: self.selections.peek(league, date).await,
            predictions: self.predictions.get(league, date).await,
            purchases: self.purchases.for_cycle(league, date).await?,
            raffle: self.raffles.get(league, date).await,
        };

        self.archive.store(&bundle, now).await?;
        self.cycles.mark(league, date, Milestone::Archived, now).await?;
        Ok(WorkerOutcome::done(
            league,
            ACTION,
            date,
            format!("archived to {}", self.archive.backend()),
        ))
    }
}
