//! API-facing errors.
//!
//! Domain rejections carry their own status code; anything else is an
//! infrastructure failure wrapped in `anyhow` and reported as a 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::league::League;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unknown league: {0}")]
    UnknownLeague(String),

    #[error("unknown worker action: {0}")]
    UnknownAction(String),

    #[error("invalid buyer id")]
    InvalidBuyer,

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("purchase window for {0} is closed")]
    WindowClosed(League),

    #[error("{league} predictions for {for_date} are not on sale")]
    NotOnSale { league: League, for_date: NaiveDate },

    #[error("buyer {buyer_id} already holds a {league} ticket for {for_date}")]
    DuplicatePurchase {
        league: League,
        for_date: NaiveDate,
        buyer_id: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("missing or invalid worker token")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UnknownLeague(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnknownAction(_) | AppError::InvalidBuyer | AppError::InvalidDate(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::WindowClosed(_)
            | AppError::NotOnSale { .. }
            | AppError::DuplicatePurchase { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                error!("Request failed: {:?}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
