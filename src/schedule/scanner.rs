//! Sliding-window scan over a forecast series.

use chrono::{DateTime, Duration, Utc};

use super::types::Window;
use crate::error::ScanError;
use crate::forecast::types::{PERIOD_MINUTES, period_length};
use crate::forecast::{CarbonIndex, ForecastSeries, IntensityPeriod};

/// Finds and ranks every feasible window of a fixed number of periods.
///
/// A window is feasible when its first period starts at or after
/// `not_before` and its last period ends at or before `deadline`. The scan
/// keeps a running intensity sum and per-band counts, so it is linear in the
/// number of periods regardless of window width.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use green_sched::forecast::{CarbonIndex, ForecastSeries, IntensityPeriod};
/// use green_sched::schedule::WindowScanner;
///
/// let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
/// let periods = [200, 150, 100, 300]
///     .iter()
///     .enumerate()
///     .map(|(i, v)| IntensityPeriod::new(t0 + Duration::minutes(30 * i as i64), *v, CarbonIndex::Moderate))
///     .collect();
/// let series = ForecastSeries::new(periods).unwrap();
///
/// let ranked = WindowScanner.scan(&series, 60, t0, t0 + Duration::hours(2)).unwrap();
/// assert_eq!(ranked[0].start, t0 + Duration::minutes(30));
/// assert_eq!(ranked[0].average_intensity, 125.0);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowScanner;

impl WindowScanner {
    /// Whole periods needed to hold `duration_minutes` (rounded up).
    pub fn periods_needed(duration_minutes: u32) -> usize {
        (duration_minutes as usize).div_ceil(PERIOD_MINUTES as usize)
    }

    /// Returns all feasible windows, lowest average intensity first.
    ///
    /// Equal averages are ordered by earlier start.
    ///
    /// # Arguments
    ///
    /// * `series` - Contiguous forecast to scan
    /// * `duration_minutes` - Requested run time; rounded up to whole periods
    /// * `not_before` - Earliest allowed window start
    /// * `deadline` - Latest allowed window end
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NoViableWindow`] when the deadline leaves less than
    /// `duration_minutes` after `not_before` (checked before touching the
    /// series), or when the series does not hold enough periods in range.
    pub fn scan(
        &self,
        series: &ForecastSeries,
        duration_minutes: u32,
        not_before: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<Vec<Window>, ScanError> {
        let width = Self::periods_needed(duration_minutes);
        if width == 0 {
            return Err(ScanError::NoViableWindow(
                "duration must be at least one minute".to_string(),
            ));
        }
        if not_before + Duration::minutes(i64::from(duration_minutes)) > deadline {
            return Err(ScanError::NoViableWindow(format!(
                "{duration_minutes} minutes do not fit between {not_before} and {deadline}"
            )));
        }

        let periods = series.periods();
        let first = periods.partition_point(|p| p.start < not_before);
        let past_last = periods.partition_point(|p| p.end <= deadline);
        if past_last < first + width {
            return Err(ScanError::NoViableWindow(format!(
                "forecast holds {} usable periods before the deadline, {width} needed",
                past_last.saturating_sub(first)
            )));
        }

        let candidates = &periods[first..past_last];
        let mut windows = Vec::with_capacity(candidates.len() - width + 1);

        let mut sum: u64 = 0;
        let mut counts = [0usize; CarbonIndex::ALL.len()];
        for p in &candidates[..width] {
            sum += u64::from(p.intensity);
            counts[p.index.severity()] += 1;
        }
        windows.push(build_window(&candidates[0], width, sum, &counts));

        for i in 1..=candidates.len() - width {
            let outgoing = &candidates[i - 1];
            let incoming = &candidates[i + width - 1];
            sum = sum - u64::from(outgoing.intensity) + u64::from(incoming.intensity);
            counts[outgoing.index.severity()] -= 1;
            counts[incoming.index.severity()] += 1;
            windows.push(build_window(&candidates[i], width, sum, &counts));
        }

        rank(&mut windows);
        Ok(windows)
    }
}

/// Sorts ascending by average intensity, then by start time.
pub fn rank(windows: &mut [Window]) {
    windows.sort_by(|a, b| {
        a.average_intensity
            .total_cmp(&b.average_intensity)
            .then(a.start.cmp(&b.start))
    });
}

fn build_window(first: &IntensityPeriod, width: usize, sum: u64, counts: &[usize]) -> Window {
    Window {
        start: first.start,
        end: first.start + period_length() * width as i32,
        average_intensity: sum as f64 / width as f64,
        dominant_index: dominant_index(counts),
        periods: width,
    }
}

/// Band with the most periods; ties go to the more severe band.
fn dominant_index(counts: &[usize]) -> CarbonIndex {
    let mut best = CarbonIndex::VeryLow;
    let mut best_count = 0;
    for index in CarbonIndex::ALL {
        let count = counts[index.severity()];
        if count > 0 && count >= best_count {
            best = index;
            best_count = count;
        }
    }
    best
}
