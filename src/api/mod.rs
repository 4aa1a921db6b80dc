//! REST API over the scheduling engine.
//!
//! Routes:
//! - `POST /api/v1/schedule/job`: best window plus alternatives for a job
//! - `GET /api/v1/carbon/forecast/{date}`: forecast for one day
//! - `GET /api/v1/carbon/forecast?start_date=&end_date=`: forecast for a date range
//! - `GET /health`: liveness and cache counters
//! - `GET /`: service banner

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::clock::Clock;
use crate::schedule::Scheduler;

pub use types::{ErrorResponse, ForecastQuery, ForecastResponse, HealthResponse, PeriodRecord};

/// Path prefix of the versioned routes.
pub const API_V1_PREFIX: &str = "/api/v1";

/// Application state shared across all request handlers.
///
/// The scheduler owns the only mutable state (its forecast cache), which
/// synchronises itself, so handlers share this through a plain `Arc`.
pub struct AppState {
    /// Scheduling engine and its forecast cache.
    pub scheduler: Scheduler,
    /// Clock used for health timestamps.
    pub clock: Arc<dyn Clock>,
}

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `state` - Shared application state
///
/// # Returns
///
/// Configured `Router` ready to serve.
pub fn router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/schedule/job", post(handlers::schedule_job))
        .route("/carbon/forecast", get(handlers::get_forecast_range))
        .route("/carbon/forecast/{date}", get(handlers::get_forecast_for_date));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest(API_V1_PREFIX, v1)
        .with_state(state)
}

/// Binds to the given address and serves the API until the process exits.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind to `addr` or the
/// server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
