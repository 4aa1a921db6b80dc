//! API response and query types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::forecast::{CacheEntry, CacheStats, ForecastRange, IntensityPeriod};

/// Error response body for 4xx/5xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind.
    pub kind: &'static str,
    /// Human-readable error message.
    pub error: String,
}

/// Date range query for the forecast endpoint.
#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    /// First day (inclusive).
    pub start_date: NaiveDate,
    /// Last day (inclusive); defaults to `start_date`.
    pub end_date: Option<NaiveDate>,
}

impl ForecastQuery {
    /// The queried range, normalised so `start <= end`.
    pub fn range(&self) -> ForecastRange {
        ForecastRange::new(self.start_date, self.end_date.unwrap_or(self.start_date))
    }
}

/// One forecast period as exposed over the API.
#[derive(Debug, Serialize)]
pub struct PeriodRecord {
    /// GB settlement period (1-48).
    pub settlement_period: u32,
    #[serde(flatten)]
    pub period: IntensityPeriod,
}

/// Forecast series with its provenance.
#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    /// Range actually served (after horizon clamping and superset reuse).
    pub range: ForecastRange,
    /// When the series was fetched from upstream.
    pub fetched_at: DateTime<Utc>,
    pub periods: Vec<PeriodRecord>,
}

impl From<&CacheEntry> for ForecastResponse {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            range: entry.range,
            fetched_at: entry.fetched_at,
            periods: entry
                .series
                .periods()
                .iter()
                .map(|p| PeriodRecord {
                    settlement_period: p.settlement_period(),
                    period: p.clone(),
                })
                .collect(),
        }
    }
}

/// Liveness payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    /// Entries currently held by the forecast cache.
    pub cache_entries: usize,
    pub cache: CacheStats,
}
