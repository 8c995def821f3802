//! HTTP surface: public league routes, worker triggers and health.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::{MatchdayView, PredictionsView, Services, WindowView};
use crate::error::{AppError, AppResult};
use crate::health::HealthState;
use crate::league::League;
use crate::purchase::Purchase;
use crate::raffle::RaffleResult;
use crate::scheduler::Scheduler;
use crate::workers::{WorkerAction, WorkerOutcome};

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub scheduler: Arc<Scheduler>,
    pub health: HealthState,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/leagues/:league/window", get(window_handler))
        .route("/api/leagues/:league/matchday", get(matchday_handler))
        .route("/api/leagues/:league/predictions", get(predictions_handler))
        .route("/api/leagues/:league/purchases", post(purchase_handler))
        .route("/api/leagues/:league/raffles/:date", get(raffle_handler))
        .route("/worker/:league/:action", post(worker_handler))
        .route("/scheduler/start", post(scheduler_start_handler))
        .route("/scheduler/stop", post(scheduler_stop_handler))
        .with_state(state)
}

/// Worker routes require the bearer token when one is configured
fn authorize(headers: &HeaderMap, services: &Services) -> AppResult<()> {
    let Some(expected) = services.config.worker_token.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let last_tick = *state.health.last_tick_time.read().await;
    let last_actions = *state.health.last_tick_actions.read().await;
    let errors = *state.health.error_count.read().await;

    let status = if errors > 5 { "degraded" } else { "ok" };
    let http_status = if errors > 10 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        http_status,
        Json(json!({
            "service": "prediction-worker",
            "version": env!("CARGO_PKG_VERSION"),
            "status": status,
            "scheduler_running": state.scheduler.is_running().await,
            "last_tick": last_tick.map(|t| t.to_rfc3339()),
            "last_tick_actions": last_actions,
            "consecutive_errors": errors
        })),
    )
}

async fn window_handler(
    State(state): State<AppState>,
    Path(league): Path<String>,
) -> AppResult<Json<WindowView>> {
    let league: League = league.parse()?;
    let now = state.services.now();
    Ok(Json(state.services.window_view(league, now).await))
}

async fn matchday_handler(
    State(state): State<AppState>,
    Path(league): Path<String>,
) -> AppResult<Json<MatchdayView>> {
    let league: League = league.parse()?;
    let now = state.services.now();
    Ok(Json(state.services.matchday_view(league, now).await))
}

#[derive(Debug, Deserialize)]
struct PredictionsQuery {
    buyer_id: Option<String>,
}

async fn predictions_handler(
    State(state): State<AppState>,
    Path(league): Path<String>,
    Query(query): Query<PredictionsQuery>,
) -> AppResult<Json<PredictionsView>> {
    let league: League = league.parse()?;
    let now = state.services.now();
    let view = state
        .services
        .predictions_view(league, query.buyer_id.as_deref(), now)
        .await;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct PurchaseRequest {
    buyer_id: String,
}

async fn purchase_handler(
    State(state): State<AppState>,
    Path(league): Path<String>,
    Json(body): Json<PurchaseRequest>,
) -> AppResult<(StatusCode, Json<Purchase>)> {
    let league: League = league.parse()?;
    let now = state.services.now();
    let purchase = state.services.purchase(league, &body.buyer_id, now).await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

async fn raffle_handler(
    State(state): State<AppState>,
    Path((league, date)): Path<(String, String)>,
) -> AppResult<Json<RaffleResult>> {
    let league: League = league.parse()?;
    let for_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| AppError::InvalidDate(date.clone()))?;

    state
        .services
        .raffles
        .get(league, for_date)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{} raffle for {}", league, for_date)))
}

async fn worker_handler(
    State(state): State<AppState>,
    Path((league, action)): Path<(String, String)>,
    headers: HeaderMap,
) -> AppResult<Json<WorkerOutcome>> {
    authorize(&headers, &state.services)?;
    let league: League = league.parse()?;
    let action: WorkerAction = action.parse()?;
    let now = state.services.now();
    let outcome = state.services.run_worker(league, action, now).await?;
    Ok(Json(outcome))
}

async fn scheduler_start_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    authorize(&headers, &state.services)?;
    let started = state.scheduler.start().await;
    Ok(Json(json!({ "running": true, "changed": started })))
}

async fn scheduler_stop_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    authorize(&headers, &state.services)?;
    let stopped = state.scheduler.stop().await;
    Ok(Json(json!({ "running": false, "changed": stopped })))
}
