//! Client for the GB Carbon Intensity API (`api.carbonintensity.org.uk`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use super::source::ForecastSource;
use super::types::{CarbonIndex, ForecastRange, ForecastSeries, IntensityPeriod};
use crate::config::CarbonApiConfig;
use crate::error::SourceError;

/// Timestamp layout used by the upstream API (`2024-03-01T12:30Z`).
const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    data: Option<Vec<ApiPeriod>>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiPeriod {
    from: String,
    to: String,
    intensity: ApiIntensity,
}

#[derive(Debug, Deserialize)]
struct ApiIntensity {
    forecast: Option<u32>,
    actual: Option<u32>,
    index: String,
}

/// HTTP-backed [`ForecastSource`].
pub struct CarbonIntensityClient {
    client: reqwest::Client,
    base_url: String,
}

impl CarbonIntensityClient {
    /// Builds a client with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Builds a client from the `[carbon_api]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Network`] if the HTTP client cannot be built.
    pub fn from_config(cfg: &CarbonApiConfig) -> Result<Self, SourceError> {
        Self::new(cfg.base_url.clone(), Duration::from_secs(cfg.timeout_secs))
    }

    /// URL for the half-hourly intensity data covering `range`.
    pub fn range_url(&self, range: ForecastRange) -> String {
        format!(
            "{}/intensity/{}/{}",
            self.base_url,
            range.start_instant().format(API_TIME_FORMAT),
            range.end_instant().format(API_TIME_FORMAT),
        )
    }
}

#[async_trait]
impl ForecastSource for CarbonIntensityClient {
    async fn fetch(&self, range: ForecastRange) -> Result<ForecastSeries, SourceError> {
        let url = self.range_url(range);
        tracing::debug!(%url, %range, "Requesting carbon intensity forecast");

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(%range, "Carbon intensity API rate limited the request");
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%range, status = status.as_u16(), "Carbon intensity API returned an error");
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let series = parse_forecast_payload(&body, range)?;
        tracing::debug!(%range, periods = series.len(), "Parsed carbon intensity forecast");
        Ok(series)
    }
}

/// Parses an upstream JSON payload into a series trimmed to `range`.
///
/// Periods outside `range` are dropped and duplicates are collapsed, since
/// the upstream endpoint includes the period that straddles `from`.
///
/// # Errors
///
/// Returns [`SourceError::Api`] for an embedded error object and
/// [`SourceError::Malformed`] when the payload is unparseable, empty, or not
/// a contiguous half-hourly series.
pub fn parse_forecast_payload(
    body: &str,
    range: ForecastRange,
) -> Result<ForecastSeries, SourceError> {
    let envelope: ApiEnvelope = serde_json::from_str(body)?;

    if let Some(err) = envelope.error {
        return Err(SourceError::Api {
            status: 200,
            message: match err.code {
                Some(code) => format!("{code}: {}", err.message),
                None => err.message,
            },
        });
    }

    let data = envelope
        .data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| SourceError::Malformed("response contains no data".to_string()))?;

    let window_start = range.start_instant();
    let window_end = range.end_instant();

    let mut periods = Vec::with_capacity(data.len());
    for raw in data {
        let start = parse_api_time(&raw.from)?;
        let end = parse_api_time(&raw.to)?;
        if start < window_start || end > window_end {
            continue;
        }
        let intensity = raw.intensity.forecast.ok_or_else(|| {
            SourceError::Malformed(format!("period {} has no forecast value", raw.from))
        })?;
        let index = CarbonIndex::parse(&raw.intensity.index).ok_or_else(|| {
            SourceError::Malformed(format!("unknown intensity index \"{}\"", raw.intensity.index))
        })?;
        periods.push(IntensityPeriod {
            start,
            end,
            intensity,
            index,
            actual: raw.intensity.actual,
        });
    }

    if periods.is_empty() {
        return Err(SourceError::Malformed(format!(
            "response holds no periods within {range}"
        )));
    }
    periods.sort_by_key(|p| p.start);
    periods.dedup_by_key(|p| p.start);
    ForecastSeries::new(periods)
}

fn parse_api_time(s: &str) -> Result<DateTime<Utc>, SourceError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, API_TIME_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SourceError::Malformed(format!("unparseable timestamp \"{s}\"")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn range() -> ForecastRange {
        ForecastRange::day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    const PAYLOAD: &str = r#"{
        "data": [
            {"from": "2024-02-29T23:30Z", "to": "2024-03-01T00:00Z",
             "intensity": {"forecast": 180, "actual": 175, "index": "moderate"}},
            {"from": "2024-03-01T00:00Z", "to": "2024-03-01T00:30Z",
             "intensity": {"forecast": 120, "actual": 118, "index": "low"}},
            {"from": "2024-03-01T00:30Z", "to": "2024-03-01T01:00Z",
             "intensity": {"forecast": 90, "actual": null, "index": "very low"}}
        ]
    }"#;

    #[test]
    fn parses_and_trims_to_range() {
        let series = parse_forecast_payload(PAYLOAD, range()).unwrap();
        assert_eq!(series.len(), 2);
        let first = &series.periods()[0];
        assert_eq!(first.start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(first.intensity, 120);
        assert_eq!(first.actual, Some(118));
        assert_eq!(series.periods()[1].index, CarbonIndex::VeryLow);
        assert_eq!(series.periods()[1].actual, None);
    }

    #[test]
    fn embedded_error_object_is_reported() {
        let body = r#"{"error": {"code": "400 Bad Request", "message": "Please enter a valid date"}}"#;
        match parse_forecast_payload(body, range()) {
            Err(SourceError::Api { message, .. }) => {
                assert!(message.contains("valid date"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn empty_data_is_malformed() {
        let err = parse_forecast_payload(r#"{"data": []}"#, range()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn payload_outside_range_is_malformed() {
        let body = r#"{"data": [{"from": "2024-02-29T23:30Z", "to": "2024-03-01T00:00Z",
            "intensity": {"forecast": 180, "actual": null, "index": "moderate"}}]}"#;
        let err = parse_forecast_payload(body, range()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(msg) if msg.contains("no periods")));
    }

    #[test]
    fn missing_forecast_value_is_malformed() {
        let body = r#"{"data": [{"from": "2024-03-01T00:00Z", "to": "2024-03-01T00:30Z",
            "intensity": {"forecast": null, "actual": 100, "index": "low"}}]}"#;
        assert!(matches!(
            parse_forecast_payload(body, range()),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn gap_in_payload_is_malformed() {
        let body = r#"{"data": [
            {"from": "2024-03-01T00:00Z", "to": "2024-03-01T00:30Z",
             "intensity": {"forecast": 100, "index": "low"}},
            {"from": "2024-03-01T01:00Z", "to": "2024-03-01T01:30Z",
             "intensity": {"forecast": 100, "index": "low"}}
        ]}"#;
        assert!(matches!(
            parse_forecast_payload(body, range()),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn not_json_is_malformed() {
        assert!(matches!(
            parse_forecast_payload("<html>", range()),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn accepts_rfc3339_timestamps() {
        assert_eq!(
            parse_api_time("2024-03-01T00:30:00+00:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap()
        );
        assert!(parse_api_time("yesterday").is_err());
    }

    #[test]
    fn range_url_uses_day_bounds() {
        let client =
            CarbonIntensityClient::new("https://example.test/", Duration::from_secs(1)).unwrap();
        let r = ForecastRange::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
        );
        assert_eq!(
            client.range_url(r),
            "https://example.test/intensity/2024-03-01T00:00Z/2024-03-03T00:00Z"
        );
    }
}
