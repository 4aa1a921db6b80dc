//! Forecast data model: intensity periods, validated series, and date ranges.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Length of one forecast period in minutes.
pub const PERIOD_MINUTES: i64 = 30;

const PERIOD_SECONDS: i64 = PERIOD_MINUTES * 60;

/// Duration of one forecast period.
pub fn period_length() -> Duration {
    Duration::minutes(PERIOD_MINUTES)
}

/// Rounds `at` down to the nearest period boundary.
pub fn floor_to_period(at: DateTime<Utc>) -> DateTime<Utc> {
    let offset = at.timestamp().rem_euclid(PERIOD_SECONDS);
    at - Duration::seconds(offset) - Duration::nanoseconds(i64::from(at.timestamp_subsec_nanos()))
}

/// Rounds `at` up to the nearest period boundary (identity on a boundary).
pub fn ceil_to_period(at: DateTime<Utc>) -> DateTime<Utc> {
    let floor = floor_to_period(at);
    if floor == at {
        at
    } else {
        floor + period_length()
    }
}

/// Whether `at` sits exactly on a period boundary.
pub fn is_period_boundary(at: DateTime<Utc>) -> bool {
    floor_to_period(at) == at
}

/// Grid carbon intensity band as published by the upstream forecast.
///
/// Variants are declared in ascending severity, so the derived `Ord` ranks
/// `VeryLow` lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CarbonIndex {
    #[serde(rename = "very_low", alias = "very low")]
    VeryLow,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "moderate")]
    Moderate,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "very_high", alias = "very high")]
    VeryHigh,
}

impl CarbonIndex {
    /// All bands, least to most severe.
    pub const ALL: [CarbonIndex; 5] = [
        CarbonIndex::VeryLow,
        CarbonIndex::Low,
        CarbonIndex::Moderate,
        CarbonIndex::High,
        CarbonIndex::VeryHigh,
    ];

    /// Position in [`CarbonIndex::ALL`].
    pub fn severity(self) -> usize {
        self as usize
    }

    /// Parses the upstream spelling (`"very low"`) or the snake-case form.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "very low" | "very_low" => Some(Self::VeryLow),
            "low" => Some(Self::Low),
            "moderate" => Some(Self::Moderate),
            "high" => Some(Self::High),
            "very high" | "very_high" => Some(Self::VeryHigh),
            _ => None,
        }
    }

    /// Snake-case name used in exports and API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for CarbonIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One half-hour forecast sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntensityPeriod {
    /// Period start (UTC, on a period boundary).
    pub start: DateTime<Utc>,
    /// Period end, exactly one period after `start`.
    pub end: DateTime<Utc>,
    /// Forecast intensity (gCO2/kWh).
    pub intensity: u32,
    /// Upstream intensity band.
    pub index: CarbonIndex,
    /// Measured intensity, once upstream has published it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<u32>,
}

impl IntensityPeriod {
    /// Creates a period starting at `start` with the fixed period length.
    pub fn new(start: DateTime<Utc>, intensity: u32, index: CarbonIndex) -> Self {
        Self {
            start,
            end: start + period_length(),
            intensity,
            index,
            actual: None,
        }
    }

    /// GB settlement period number of the start time (1-48).
    pub fn settlement_period(&self) -> u32 {
        (self.start.hour() * 60 + self.start.minute()) / PERIOD_MINUTES as u32 + 1
    }
}

/// Time-ordered, gap-free sequence of forecast periods.
///
/// The only way to build one is [`ForecastSeries::new`], which rejects gaps,
/// overlaps, misaligned or wrongly sized periods. Series are immutable once
/// built and shared behind `Arc` by the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ForecastSeries {
    periods: Vec<IntensityPeriod>,
}

impl ForecastSeries {
    /// Validates and wraps `periods`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] if any period is not exactly one
    /// period long, does not start on a boundary, or does not begin where the
    /// previous one ended.
    pub fn new(periods: Vec<IntensityPeriod>) -> Result<Self, SourceError> {
        for (i, p) in periods.iter().enumerate() {
            if p.end - p.start != period_length() {
                return Err(SourceError::Malformed(format!(
                    "period {i} spans {} minutes, expected {PERIOD_MINUTES}",
                    (p.end - p.start).num_minutes()
                )));
            }
            if !is_period_boundary(p.start) {
                return Err(SourceError::Malformed(format!(
                    "period {i} starts off-boundary at {}",
                    p.start
                )));
            }
            if i > 0 && periods[i - 1].end != p.start {
                return Err(SourceError::Malformed(format!(
                    "period {i} starts at {} but previous ended at {}",
                    p.start,
                    periods[i - 1].end
                )));
            }
        }
        Ok(Self { periods })
    }

    /// All periods in start order.
    pub fn periods(&self) -> &[IntensityPeriod] {
        &self.periods
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Start of the first period.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.periods.first().map(|p| p.start)
    }

    /// End of the last period.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.periods.last().map(|p| p.end)
    }

    /// Sub-ranges of `[from, to)` that the series has no data for.
    ///
    /// Because the series is contiguous, at most a leading and a trailing gap
    /// can be missing.
    pub fn uncovered(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        if from >= to {
            return Vec::new();
        }
        let (Some(start), Some(end)) = (self.start(), self.end()) else {
            return vec![(from, to)];
        };
        if end <= from || start >= to {
            return vec![(from, to)];
        }

        let mut gaps = Vec::new();
        if start > from {
            gaps.push((from, start));
        }
        if end < to {
            gaps.push((end, to));
        }
        gaps
    }

    /// Whether every instant of `[from, to)` has forecast data.
    pub fn covers(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.uncovered(from, to).is_empty()
    }
}

/// Inclusive calendar-date range, the cache key for forecast series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ForecastRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ForecastRange {
    /// Creates a range, swapping the bounds if given in reverse.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Single-day range.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Range of UTC calendar dates touched by `[from, to]`.
    pub fn spanning(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::new(from.date_naive(), to.date_naive())
    }

    /// Number of calendar days in the range.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Whether `other` lies entirely within this range.
    pub fn contains(&self, other: &ForecastRange) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Truncates the range to at most `max_days` days past the start date.
    ///
    /// Returns the clamped range and whether truncation happened.
    pub fn clamp_days(self, max_days: u32) -> (Self, bool) {
        let limit = self.start + Duration::days(i64::from(max_days));
        if self.end > limit {
            (
                Self {
                    start: self.start,
                    end: limit,
                },
                true,
            )
        } else {
            (self, false)
        }
    }

    /// Midnight UTC at the start of the first day.
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC after the last day.
    pub fn end_instant(&self) -> DateTime<Utc> {
        (self.end + Duration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
    }
}

impl fmt::Display for ForecastRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
