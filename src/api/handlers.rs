//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use serde_json::{Value, json};

use super::AppState;
use super::types::{ErrorResponse, ForecastQuery, ForecastResponse, HealthResponse};
use crate::error::ScheduleError;
use crate::forecast::ForecastRange;
use crate::schedule::{ScheduleRequest, ScheduleResult};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Schedules a job in the lowest-carbon window before its deadline.
///
/// `POST /api/v1/schedule/job` → 200 + `ScheduleResult` JSON
/// → 400 invalid request, 404 no viable window, 503 forecast unavailable
pub async fn schedule_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<ScheduleResult> {
    state
        .scheduler
        .schedule(&request)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Returns the forecast for a single day.
///
/// `GET /api/v1/carbon/forecast/2024-03-01` → 200 + `ForecastResponse` JSON
/// `GET /api/v1/carbon/forecast/yesterday` → 400
pub async fn get_forecast_for_date(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> ApiResult<ForecastResponse> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
        error_response(ScheduleError::InvalidRequest(format!(
            "date \"{date}\" must be in YYYY-MM-DD format"
        )))
    })?;
    forecast_for(&state, ForecastRange::day(date)).await
}

/// Returns the forecast for a date range.
///
/// `GET /api/v1/carbon/forecast?start_date=2024-03-01&end_date=2024-03-02`
pub async fn get_forecast_range(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForecastQuery>,
) -> ApiResult<ForecastResponse> {
    forecast_for(&state, query.range()).await
}

/// `GET /health` → 200 + `HealthResponse` JSON
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let cache = state.scheduler.cache();
    Json(HealthResponse {
        status: "ok",
        timestamp: state.clock.now(),
        version: env!("CARGO_PKG_VERSION"),
        cache_entries: cache.len(),
        cache: cache.stats(),
    })
}

/// `GET /` → service banner
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "green-sched: low-carbon job scheduling",
        "version": env!("CARGO_PKG_VERSION"),
        "schedule": format!("{}/schedule/job", super::API_V1_PREFIX),
    }))
}

async fn forecast_for(state: &AppState, range: ForecastRange) -> ApiResult<ForecastResponse> {
    let entry = state
        .scheduler
        .forecast(range)
        .await
        .map_err(error_response)?;
    Ok(Json(ForecastResponse::from(entry.as_ref())))
}

/// Maps each engine error kind to its HTTP status.
fn error_response(err: ScheduleError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, kind) = match &err {
        ScheduleError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        ScheduleError::NoViableWindow(_) => (StatusCode::NOT_FOUND, "no_viable_window"),
        ScheduleError::SchedulingUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "scheduling_unavailable")
        }
        ScheduleError::Cancelled => (StatusCode::REQUEST_TIMEOUT, "cancelled"),
    };
    (
        status,
        Json(ErrorResponse {
            kind,
            error: err.to_string(),
        }),
    )
}
