//! Shared service state: stores, sports client, archive and clock.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::archive::Archive;
use crate::config::Config;
use crate::cycle::{CycleRecord, CycleTracker};
use crate::error::{AppError, AppResult};
use crate::league::League;
use crate::matchday::{matchday_at, Matchday};
use crate::prediction::{Prediction, PredictionBook, Teaser};
use crate::purchase::{normalize_buyer_id, Purchase, PurchaseLedger};
use crate::raffle::RaffleBook;
use crate::selection::SelectionLock;
use crate::sports_api::SportsClient;
use crate::window::{Cycle, WindowStatus};

/// Source of "now"; fixed in tests
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }
}

pub struct Services {
    pub config: Config,
    pub clock: Clock,
    pub sports: SportsClient,
    pub selections: SelectionLock,
    pub predictions: PredictionBook,
    pub purchases: PurchaseLedger,
    pub raffles: RaffleBook,
    pub cycles: CycleTracker,
    pub archive: Archive,
}

impl Services {
    /// Build from config, connecting the Postgres archive if configured
    pub async fn connect(config: Config) -> Result<Self> {
        let archive = match &config.database_url {
            Some(url) => Archive::postgres(url).await?,
            None => Archive::json(config.data_dir.join("archive")),
        };
        Self::with_archive(config, archive, Clock::System)
    }

    pub fn with_archive(config: Config, archive: Archive, clock: Clock) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data dir {}", config.data_dir.display()))?;

        let sports = SportsClient::new(config.sports_api_key.clone(), config.sports_api_base_url.clone())?;
        let dir = config.data_dir.clone();
        let max_age = Duration::try_hours(config.selection_max_age_hours).ok_or_else(|| {
            anyhow!(
                "selection max age of {} hours is out of range",
                config.selection_max_age_hours
            )
        })?;

        info!(
            "Data directory {}, archive backend {}",
            dir.display(),
            archive.backend()
        );

        Ok(Self {
            sports,
            selections: SelectionLock::new(dir.join("selections.json"), max_age),
            predictions: PredictionBook::new(dir.join("predictions.json")),
            purchases: PurchaseLedger::new(dir.join("purchases.json")),
            raffles: RaffleBook::new(dir.join("raffles.json")),
            cycles: CycleTracker::new(dir.join("cycles.json")),
            archive,
            clock,
            config,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Buy a ticket for the cycle currently on sale
    pub async fn purchase(&self, league: League, buyer_id: &str, now: DateTime<Utc>) -> AppResult<Purchase> {
        let buyer_id = normalize_buyer_id(buyer_id)?;
        let window = league.window();
        if !window.is_open(now) {
            return Err(AppError::WindowClosed(league));
        }

        let matchday = matchday_at(league, now);
        let record = self.cycles.get(league, matchday.for_date).await;
        if record.opened_at.is_none() || record.closed_at.is_some() {
            return Err(AppError::NotOnSale {
                league,
                for_date: matchday.for_date,
            });
        }

        self.purchases
            .record(league, matchday.for_date, &buyer_id, self.config.ticket_price, now)
            .await
    }

    /// Predictions for the current matchday, full for ticket holders
    pub async fn predictions_view(
        &self,
        league: League,
        buyer_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> PredictionsView {
        let matchday = matchday_at(league, now);
        let record = self.cycles.get(league, matchday.for_date).await;
        let set = match record.opened_at {
            Some(_) => self.predictions.get(league, matchday.for_date).await,
            None => None,
        };
        let predictions = set.map(|s| s.predictions).unwrap_or_default();

        let unlocked = match buyer_id.map(str::trim).filter(|b| !b.is_empty()) {
            Some(buyer) => self.purchases.has_ticket(league, matchday.for_date, buyer).await,
            None => false,
        };

        PredictionsView {
            league,
            for_date: matchday.for_date,
            on_sale: record.opened_at.is_some() && record.closed_at.is_none(),
            unlocked,
            teasers: if unlocked {
                Vec::new()
            } else {
                predictions.iter().map(Teaser::from).collect()
            },
            predictions: if unlocked { predictions } else { Vec::new() },
        }
    }

    pub async fn window_view(&self, league: League, now: DateTime<Utc>) -> WindowView {
        let window = league.window();
        let cycle = window.current_cycle(now);
        let matchday = matchday_at(league, now);
        WindowView {
            status: window.status(now),
            cycle,
            matchday,
            progress: self.cycles.get(league, matchday.for_date).await,
        }
    }

    pub async fn matchday_view(&self, league: League, now: DateTime<Utc>) -> MatchdayView {
        let matchday = matchday_at(league, now);
        let selection = self.selections.get(league, matchday.for_date, now).await;
        MatchdayView {
            matchday,
            match_ids: selection.map(|s| s.match_ids).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WindowView {
    pub status: WindowStatus,
    pub cycle: Cycle,
    pub matchday: Matchday,
    pub progress: CycleRecord,
}

#[derive(Debug, Serialize)]
pub struct MatchdayView {
    pub matchday: Matchday,
    pub match_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictionsView {
    pub league: League,
    pub for_date: NaiveDate,
    pub on_sale: bool,
    pub unlocked: bool,
    pub predictions: Vec<Prediction>,
    pub teasers: Vec<Teaser>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn out_of_range_max_age_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new("test-key", dir.path());
        config.selection_max_age_hours = i64::MAX;
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 2, 0, 0).unwrap();

        let res = Services::with_archive(config, Archive::json(dir.path().join("archive")), Clock::Fixed(now));
        assert!(res.is_err());
    }
}
