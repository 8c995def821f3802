//! Daily raffle among a cycle's ticket holders.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::league::League;
use crate::purchase::Purchase;
use crate::selection::cycle_key;
use crate::store::JsonStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub buyer_id: String,
    pub purchase_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleResult {
    pub league: League,
    pub for_date: NaiveDate,
    pub drawn_at: DateTime<Utc>,
    pub ticket_count: usize,
    pub pool: u64,
    pub payout: u64,
    pub winner: Option<Winner>,
}

/// Each purchase is one ticket; the winner is drawn uniformly.
pub fn draw<R: Rng + ?Sized>(
    league: League,
    for_date: NaiveDate,
    tickets: &[Purchase],
    payout_percent: u8,
    now: DateTime<Utc>,
    rng: &mut R,
) -> RaffleResult {
    let pool = tickets.iter().fold(0u64, |acc, p| acc.saturating_add(p.amount));
    let winner = tickets.choose(rng).map(|p| Winner {
        buyer_id: p.buyer_id.clone(),
        purchase_id: p.id,
    });
    let payout = if winner.is_some() {
        let percent = u128::from(payout_percent.min(100));
        // u128 so large pools cannot overflow before the division
        (u128::from(pool) * percent / 100) as u64
    } else {
        0
    };

    RaffleResult {
        league,
        for_date,
        drawn_at: now,
        ticket_count: tickets.len(),
        pool,
        payout,
        winner,
    }
}

pub struct RaffleBook {
    store: JsonStore<BTreeMap<String, RaffleResult>>,
}

impl RaffleBook {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            store: JsonStore::new(path.as_ref()),
        }
    }

    pub async fn get(&self, league: League, for_date: NaiveDate) -> Option<RaffleResult> {
        self.store.load().await.remove(&cycle_key(league, for_date))
    }

    /// Record a result unless the cycle was already drawn; returns the kept one
    pub async fn record_once(&self, result: RaffleResult) -> Result<(RaffleResult, bool)> {
        let key = cycle_key(result.league, result.for_date);
        self.store
            .update(|book| match book.get(&key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    book.insert(key.clone(), result.clone());
                    (result, true)
                }
            })
            .await
    }
}
