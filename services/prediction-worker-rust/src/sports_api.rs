//! Fixture lookup against The Odds API.
//!
//! Only the events endpoint is used; it lists upcoming fixtures with teams and
//! kickoff time and does not count against the odds quota.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::info;

use crate::league::League;
use crate::matchday::Matchday;

/// Event as returned by `/v4/sports/{sport}/events`
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ApiEvent {
    pub id: String,
    pub sport_key: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub home_team: String,
    pub away_team: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
}

/// Externally owned fixture, read and filtered only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRef {
    pub external_id: String,
    pub home_team: String,
    pub away_team: String,
    pub start_instant: DateTime<Utc>,
    pub status: MatchStatus,
}

impl MatchRef {
    fn from_event(event: ApiEvent, now: DateTime<Utc>) -> Option<Self> {
        let start_instant = event.commence_time?;
        if event.id.is_empty() || event.home_team.is_empty() || event.away_team.is_empty() {
            return None;
        }
        let status = if start_instant <= now {
            MatchStatus::InProgress
        } else {
            MatchStatus::Scheduled
        };

        Some(Self {
            external_id: event.id,
            home_team: event.home_team,
            away_team: event.away_team,
            start_instant,
            status,
        })
    }
}

type DirectLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

pub struct SportsClient {
    api_key: String,
    base_url: String,
    http_client: reqwest::Client,
    rate_limiter: DirectLimiter,
}

impl SportsClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        // 45 requests per minute (The Odds API limit)
        let per_minute = NonZeroU32::new(45).ok_or_else(|| anyhow!("rate limit must be non-zero"))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    /// Fixtures kicking off inside the matchday, earliest first
    pub async fn fetch_fixtures(
        &self,
        league: League,
        matchday: &Matchday,
        now: DateTime<Utc>,
    ) -> Result<Vec<MatchRef>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v4/sports/{}/events", self.base_url, league.sport_key());
        let from = matchday.starts_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let to = matchday.ends_at.to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("commenceTimeFrom", from.as_str()),
                ("commenceTimeTo", to.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to fetch {} fixtures", league))?;

        if let Some(remaining) = response.headers().get("x-requests-remaining") {
            info!("API requests remaining: {}", remaining.to_str().unwrap_or("?"));
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            return Err(anyhow!("Sports API error (status {}): {}", status, body));
        }

        let events: Vec<ApiEvent> =
            serde_json::from_str(&body).context("Failed to parse fixtures")?;
        let total = events.len();

        // The API filters loosely on the boundaries; re-check against the matchday.
        let mut fixtures: Vec<MatchRef> = events
            .into_iter()
            .filter_map(|e| MatchRef::from_event(e, now))
            .filter(|m| matchday.contains(m.start_instant))
            .collect();
        fixtures.sort_by(|a, b| {
            a.start_instant
                .cmp(&b.start_instant)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });

        info!(
            "Fetched {} {} fixtures for {} ({} events returned)",
            fixtures.len(),
            league,
            matchday.for_date,
            total
        );
        Ok(fixtures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchday::matchday_at;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn fetches_and_filters_fixtures() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 2, 0, 0).unwrap();
        let matchday = matchday_at(League::Nba, now);

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v4/sports/basketball_nba/events")
                    .query_param("apiKey", "test-key")
                    .query_param("commenceTimeFrom", "2026-10-16T17:00:00Z")
                    .query_param("commenceTimeTo", "2026-10-17T17:00:00Z");
                then.status(200).json_body(json!([
                    {"id": "late", "home_team": "Lakers", "away_team": "Suns",
                     "commence_time": "2026-10-17T02:30:00Z"},
                    {"id": "early", "home_team": "Celtics", "away_team": "Knicks",
                     "commence_time": "2026-10-16T23:30:00Z"},
                    {"id": "outside", "home_team": "Heat", "away_team": "Bulls",
                     "commence_time": "2026-10-18T00:00:00Z"},
                    {"id": "no-time", "home_team": "Jazz", "away_team": "Kings"}
                ]));
            })
            .await;

        let client = SportsClient::new("test-key", server.base_url()).unwrap();
        let fixtures = client.fetch_fixtures(League::Nba, &matchday, now).await.unwrap();

        mock.assert_async().await;
        let ids: Vec<&str> = fixtures.iter().map(|m| m.external_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert!(fixtures.iter().all(|m| m.status == MatchStatus::Scheduled));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 2, 0, 0).unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v4/sports/soccer_epl/events");
                then.status(401).body("invalid key");
            })
            .await;

        let client = SportsClient::new("bad", server.base_url()).unwrap();
        let err = client
            .fetch_fixtures(League::Epl, &matchday_at(League::Epl, now), now)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
