#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use httpmock::prelude::*;
use httpmock::Mock;
use prediction_worker::archive::Archive;
use prediction_worker::{Clock, Config, Services};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Services over a shared data dir with a fixed clock
pub fn services_at(dir: &Path, base_url: &str, now: DateTime<Utc>, token: Option<&str>) -> Arc<Services> {
    let mut config = Config::new("test-key", dir);
    config.sports_api_base_url = base_url.to_string();
    config.worker_token = token.map(str::to_string);
    let archive = Archive::json(dir.join("archive"));
    Arc::new(Services::with_archive(config, archive, Clock::Fixed(now)).unwrap())
}

/// Two NBA games on the 2026-10-17 WIB matchday
pub async fn mock_nba_fixtures(server: &MockServer) -> Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v4/sports/basketball_nba/events");
            then.status(200).json_body(json!([
                {"id": "nba-2", "sport_key": "basketball_nba", "home_team": "Golden State Warriors",
                 "away_team": "Denver Nuggets", "commence_time": "2026-10-17T02:30:00Z"},
                {"id": "nba-1", "sport_key": "basketball_nba", "home_team": "Boston Celtics",
                 "away_team": "New York Knicks", "commence_time": "2026-10-16T23:30:00Z"}
            ]));
        })
        .await
}

pub async fn mock_soccer_empty(server: &MockServer) {
    for sport in ["soccer_epl", "soccer_spain_la_liga"] {
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/v4/sports/{}/events", sport));
                then.status(200).json_body(json!([]));
            })
            .await;
    }
}
