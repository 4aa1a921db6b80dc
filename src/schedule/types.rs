//! Scheduling request, candidate window, and result types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::forecast::{CarbonIndex, ForecastRange};

/// Advisory job priority. Carried through to the result; does not affect ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    /// Parses `low`, `medium` or `high` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// A request to place a job of `duration_minutes` before `deadline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Job run time in minutes.
    pub duration_minutes: u32,
    /// Instant by which the job must have finished (UTC).
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    /// Optional caller label, echoed in logs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
}

impl ScheduleRequest {
    /// Creates a low-priority, unnamed request.
    pub fn new(duration_minutes: u32, deadline: DateTime<Utc>) -> Self {
        Self {
            duration_minutes,
            deadline,
            priority: Priority::default(),
            job_name: None,
        }
    }

    /// Sets the advisory priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// A candidate run slot made of whole consecutive forecast periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    /// First period start.
    pub start: DateTime<Utc>,
    /// Last period end.
    pub end: DateTime<Utc>,
    /// Mean forecast intensity over the window (gCO2/kWh).
    pub average_intensity: f64,
    /// Band covering the largest share of the window's periods.
    pub dominant_index: CarbonIndex,
    /// Number of periods in the window.
    pub periods: usize,
}

impl Window {
    /// Whether the two windows share any instant.
    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Window length in minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} → {}  avg {:>7.2} gCO2/kWh  ({})",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%H:%M"),
            self.average_intensity,
            self.dominant_index,
        )
    }
}

/// How far the result can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Fresh data fully covering the requested span.
    High,
    /// Stale data or a forecast that stops short of the deadline.
    Low,
}

/// Facts about how a result was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleMetadata {
    /// Feasible windows scanned.
    pub periods_analyzed: usize,
    /// Age of the forecast used, in minutes.
    pub cache_age_minutes: i64,
    pub confidence: Confidence,
    /// Duration the caller asked for.
    pub requested_duration_minutes: u32,
    /// Actual window length after rounding up to whole periods.
    pub window_duration_minutes: u32,
    /// Forecast date range consulted.
    pub forecast_range: ForecastRange,
    /// Advisory priority echoed from the request.
    pub priority: Priority,
}

/// Best window, ranked alternatives, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleResult {
    pub primary: Window,
    /// Best-first, never containing `primary`.
    pub alternatives: Vec<Window>,
    pub metadata: ScheduleMetadata,
}
