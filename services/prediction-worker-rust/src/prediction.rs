//! Prediction generation and the per-cycle prediction book.
//!
//! Predictions are fabricated: random scores that respect the sport's scoring
//! range, a pick that follows the score, and a templated blurb.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::league::League;
use crate::selection::cycle_key;
use crate::sports_api::MatchRef;
use crate::store::JsonStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pick {
    Home,
    Away,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub match_id: String,
    pub league: League,
    pub for_date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub starts_at: DateTime<Utc>,
    pub pick: Pick,
    pub home_score: u16,
    pub away_score: u16,
    /// Percent, 55..=90
    pub confidence: u8,
    pub analysis: String,
}

/// What non-buyers get to see
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Teaser {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub starts_at: DateTime<Utc>,
}

impl From<&Prediction> for Teaser {
    fn from(p: &Prediction) -> Self {
        Self {
            match_id: p.match_id.clone(),
            home_team: p.home_team.clone(),
            away_team: p.away_team.clone(),
            starts_at: p.starts_at,
        }
    }
}

const WIN_TEMPLATES: &[&str] = &[
    "{winner} have the sharper recent form and should control this one against {loser}.",
    "Expect {winner} to edge a tight contest; {loser} struggle to close games.",
    "{winner} match up well here and {loser} are short on rest.",
    "Momentum favours {winner}. {loser} have dropped points in similar spots.",
    "{loser} will make it competitive, but {winner} carry more threat late on.",
];

const DRAW_TEMPLATES: &[&str] = &[
    "{home} and {away} look evenly matched; a share of the points is the likeliest result.",
    "Neither {home} nor {away} can afford to lose, expect a cagey draw.",
];

pub fn generate<R: Rng + ?Sized>(
    league: League,
    for_date: NaiveDate,
    matches: &[MatchRef],
    rng: &mut R,
) -> Vec<Prediction> {
    matches
        .iter()
        .map(|m| predict_match(league, for_date, m, rng))
        .collect()
}

fn predict_match<R: Rng + ?Sized>(
    league: League,
    for_date: NaiveDate,
    m: &MatchRef,
    rng: &mut R,
) -> Prediction {
    let (mut home_score, mut away_score): (u16, u16) = if league.allows_draw() {
        (rng.gen_range(0..=3), rng.gen_range(0..=3))
    } else {
        (rng.gen_range(95..=130), rng.gen_range(95..=130))
    };

    // No ties in basketball: give one side the extra point.
    if !league.allows_draw() && home_score == away_score {
        if rng.gen_bool(0.5) {
            home_score += 1;
        } else {
            away_score += 1;
        }
    }

    let pick = match home_score.cmp(&away_score) {
        std::cmp::Ordering::Greater => Pick::Home,
        std::cmp::Ordering::Less => Pick::Away,
        std::cmp::Ordering::Equal => Pick::Draw,
    };

    let analysis = match pick {
        Pick::Draw => DRAW_TEMPLATES
            .choose(rng)
            .unwrap_or(&DRAW_TEMPLATES[0])
            .replace("{home}", &m.home_team)
            .replace("{away}", &m.away_team),
        Pick::Home | Pick::Away => {
            let (winner, loser) = if pick == Pick::Home {
                (&m.home_team, &m.away_team)
            } else {
                (&m.away_team, &m.home_team)
            };
            WIN_TEMPLATES
                .choose(rng)
                .unwrap_or(&WIN_TEMPLATES[0])
                .replace("{winner}", winner)
                .replace("{loser}", loser)
        }
    };

    Prediction {
        match_id: m.external_id.clone(),
        league,
        for_date,
        home_team: m.home_team.clone(),
        away_team: m.away_team.clone(),
        starts_at: m.start_instant,
        pick,
        home_score,
        away_score,
        confidence: rng.gen_range(55..=90),
        analysis,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionSet {
    pub generated_at: DateTime<Utc>,
    pub predictions: Vec<Prediction>,
}

pub struct PredictionBook {
    store: JsonStore<BTreeMap<String, PredictionSet>>,
}

impl PredictionBook {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            store: JsonStore::new(path.as_ref()),
        }
    }

    pub async fn get(&self, league: League, for_date: NaiveDate) -> Option<PredictionSet> {
        self.store.load().await.remove(&cycle_key(league, for_date))
    }

    /// Store a set unless one already exists; returns the set that is kept
    pub async fn insert_once(
        &self,
        league: League,
        for_date: NaiveDate,
        set: PredictionSet,
    ) -> Result<(PredictionSet, bool)> {
        let key = cycle_key(league, for_date);
        let (kept, inserted) = self
            .store
            .update(|book| match book.get(&key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    book.insert(key.clone(), set.clone());
                    (set, true)
                }
            })
            .await?;

        if inserted {
            info!(
                "Stored {} {} predictions for {}",
                kept.predictions.len(),
                league,
                for_date
            );
        }
        Ok((kept, inserted))
    }
}
