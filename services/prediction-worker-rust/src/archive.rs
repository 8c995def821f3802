//! Completed-cycle archive.
//!
//! Postgres when `DATABASE_URL` is configured, otherwise one JSON file per
//! cycle under the data directory.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::cycle::CycleRecord;
use crate::league::League;
use crate::prediction::PredictionSet;
use crate::purchase::Purchase;
use crate::raffle::RaffleResult;
use crate::selection::Selection;

/// Everything a finished cycle produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleBundle {
    pub league: League,
    pub for_date: NaiveDate,
    pub cycle: CycleRecord,
    pub selection: Option<Selection>,
    pub predictions: Option<PredictionSet>,
    pub purchases: Vec<Purchase>,
    pub raffle: Option<RaffleResult>,
}

pub enum Archive {
    Json { dir: PathBuf },
    Postgres { db: PgPool },
}

impl Archive {
    pub fn json(dir: impl Into<PathBuf>) -> Self {
        Archive::Json { dir: dir.into() }
    }

    pub async fn postgres(url: &str) -> Result<Self> {
        let db = connect_db_with_retry(url, 5).await?;
        Ok(Archive::Postgres { db })
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Archive::Json { .. } => "json",
            Archive::Postgres { .. } => "postgres",
        }
    }

    pub async fn store(&self, bundle: &CycleBundle, now: DateTime<Utc>) -> Result<()> {
        match self {
            Archive::Json { dir } => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                let path = dir.join(format!("{}-{}.json", bundle.league, bundle.for_date));
                let json = serde_json::to_string_pretty(bundle)?;
                tokio::fs::write(&path, json)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Archived {} {} to {}", bundle.league, bundle.for_date, path.display());
            }
            Archive::Postgres { db } => {
                let payload = serde_json::to_value(bundle)?;
                // Re-archiving the same cycle replaces the payload.
                sqlx::query(
                    r#"
                    INSERT INTO cycle_archive (league, for_date, payload, archived_at)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (league, for_date) DO UPDATE SET
                        payload = EXCLUDED.payload,
                        archived_at = EXCLUDED.archived_at
                    "#,
                )
                .bind(bundle.league.slug())
                .bind(bundle.for_date)
                .bind(payload)
                .bind(now)
                .execute(db)
                .await
                .context("Failed to archive cycle")?;
                info!("Archived {} {} to Postgres", bundle.league, bundle.for_date);
            }
        }
        Ok(())
    }
}

async fn connect_db_with_retry(url: &str, max_retries: u32) -> Result<PgPool> {
    let mut attempt = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
        {
            Ok(pool) => {
                info!("Connected to PostgreSQL");
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;
                if attempt >= max_retries {
                    return Err(anyhow!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries,
                        e
                    ));
                }
                warn!("Database connection attempt {} failed: {}. Retrying...", attempt, e);
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
        }
    }
}
