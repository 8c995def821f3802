//! Ticket purchases, one per buyer per cycle.
//!
//! The ledger keeps each cycle's tickets as a raw JSON value. A corrupt cycle
//! blocks reads and sales for that cycle only; every other cycle stays usable
//! and is written back untouched.

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::league::League;
use crate::selection::cycle_key;
use crate::store::JsonStore;

const MAX_BUYER_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub league: League,
    pub for_date: NaiveDate,
    pub buyer_id: String,
    pub amount: u64,
    pub purchased_at: DateTime<Utc>,
}

/// Trim and bound a buyer id supplied by a client
pub fn normalize_buyer_id(raw: &str) -> AppResult<String> {
    let id = raw.trim();
    if id.is_empty() || id.len() > MAX_BUYER_ID_LEN || id.chars().any(char::is_control) {
        return Err(AppError::InvalidBuyer);
    }
    Ok(id.to_string())
}

pub type PurchaseBook = BTreeMap<String, Value>;

fn decode_tickets(key: &str, raw: &Value) -> anyhow::Result<Vec<Purchase>> {
    serde_json::from_value(raw.clone()).with_context(|| format!("Malformed purchase entry {}", key))
}

pub struct PurchaseLedger {
    store: JsonStore<PurchaseBook>,
}

impl PurchaseLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            store: JsonStore::new(path.as_ref()),
        }
    }

    pub async fn record(
        &self,
        league: League,
        for_date: NaiveDate,
        buyer_id: &str,
        amount: u64,
        now: DateTime<Utc>,
    ) -> AppResult<Purchase> {
        let key = cycle_key(league, for_date);
        let buyer_id = buyer_id.to_string();

        let purchase = self
            .store
            .update(|book| {
                let mut tickets = match book.get(&key) {
                    Some(raw) => decode_tickets(&key, raw)?,
                    None => Vec::new(),
                };
                if tickets.iter().any(|p| p.buyer_id == buyer_id) {
                    return Err(AppError::DuplicatePurchase {
                        league,
                        for_date,
                        buyer_id: buyer_id.clone(),
                    });
                }

                let purchase = Purchase {
                    id: Uuid::new_v4(),
                    league,
                    for_date,
                    buyer_id: buyer_id.clone(),
                    amount,
                    purchased_at: now,
                };
                tickets.push(purchase.clone());
                let value = serde_json::to_value(&tickets).map_err(anyhow::Error::from)?;
                book.insert(key.clone(), value);
                Ok(purchase)
            })
            .await??;

        info!(
            "Recorded {} ticket {} for {} ({})",
            league, purchase.id, for_date, purchase.buyer_id
        );
        Ok(purchase)
    }

    /// Tickets sold for one cycle. Errors rather than reporting an empty
    /// cycle when the ledger or that cycle's entry cannot be read.
    pub async fn for_cycle(&self, league: League, for_date: NaiveDate) -> anyhow::Result<Vec<Purchase>> {
        let key = cycle_key(league, for_date);
        let book = self.store.try_load().await?;
        let Some(raw) = book.get(&key) else {
            return Ok(Vec::new());
        };

        let tickets = decode_tickets(&key, raw)?;
        if let Some(stray) = tickets.iter().find(|p| p.league != league || p.for_date != for_date) {
            return Err(anyhow!("Purchase {} filed under mismatched key {}", stray.id, key));
        }
        Ok(tickets)
    }

    /// Whether `buyer_id` holds a ticket; an unreadable cycle holds none
    pub async fn has_ticket(&self, league: League, for_date: NaiveDate, buyer_id: &str) -> bool {
        match self.for_cycle(league, for_date).await {
            Ok(tickets) => tickets.iter().any(|p| p.buyer_id == buyer_id),
            Err(e) => {
                warn!("Cannot check {} {} ticket for {}: {:#}", league, for_date, buyer_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn buyer_ids_are_trimmed_and_bounded() {
        assert_eq!(normalize_buyer_id("  alice ").unwrap(), "alice");
        assert!(matches!(normalize_buyer_id("   "), Err(AppError::InvalidBuyer)));
        assert!(matches!(
            normalize_buyer_id(&"x".repeat(65)),
            Err(AppError::InvalidBuyer)
        ));
        assert!(matches!(normalize_buyer_id("a\nb"), Err(AppError::InvalidBuyer)));
    }

    #[tokio::test]
    async fn second_ticket_for_same_buyer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = PurchaseLedger::new(dir.path().join("purchases.json"));
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();

        let first = ledger.record(League::Nba, date, "alice", 10_000, now).await.unwrap();
        assert_eq!(first.amount, 10_000);

        let dup = ledger.record(League::Nba, date, "alice", 10_000, now).await;
        assert!(matches!(dup, Err(AppError::DuplicatePurchase { .. })));

        // Other leagues are a different cycle
        ledger.record(League::Epl, date, "alice", 10_000, now).await.unwrap();
        ledger.record(League::Nba, date, "bob", 10_000, now).await.unwrap();

        assert_eq!(ledger.for_cycle(League::Nba, date).await.unwrap().len(), 2);
        assert!(ledger.has_ticket(League::Nba, date, "bob").await);
        assert!(!ledger.has_ticket(League::Laliga, date, "bob").await);
    }

    #[tokio::test]
    async fn corrupt_cycle_entry_does_not_erase_other_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purchases.json");
        let ledger = PurchaseLedger::new(&path);
        let d16 = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let d17 = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();

        ledger.record(League::Nba, d16, "alice", 10_000, now).await.unwrap();

        // Damage only the EPL entry
        let mut book: serde_json::Map<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        book.insert("epl:2026-10-17".into(), Value::String("garbage".into()));
        std::fs::write(&path, serde_json::to_string(&book).unwrap()).unwrap();

        ledger.record(League::Nba, d17, "bob", 10_000, now).await.unwrap();

        let alice = ledger.for_cycle(League::Nba, d16).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].buyer_id, "alice");
        assert_eq!(ledger.for_cycle(League::Nba, d17).await.unwrap().len(), 1);

        // The damaged cycle refuses reads and sales instead of looking empty
        assert!(ledger.for_cycle(League::Epl, d17).await.is_err());
        assert!(!ledger.has_ticket(League::Epl, d17, "carol").await);
        assert!(matches!(
            ledger.record(League::Epl, d17, "carol", 10_000, now).await,
            Err(AppError::Internal(_))
        ));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("garbage"));
    }

    #[tokio::test]
    async fn unparseable_ledger_is_an_error_not_an_empty_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purchases.json");
        std::fs::write(&path, "[truncated").unwrap();
        let ledger = PurchaseLedger::new(&path);
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();

        assert!(ledger.for_cycle(League::Nba, date).await.is_err());
        assert!(ledger.record(League::Nba, date, "alice", 10_000, now).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[truncated");
    }
}
