//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use green_sched::clock::{Clock, ManualClock};
use green_sched::config::{CacheConfig, SchedulingConfig};
use green_sched::error::SourceError;
use green_sched::forecast::{
    CarbonIndex, ForecastCache, ForecastRange, ForecastSeries, ForecastSource, IntensityPeriod,
};
use green_sched::schedule::Scheduler;

/// Midnight UTC on 2024-03-01, the epoch of every fixture series.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// `t0() + minutes`.
pub fn at_min(minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(minutes)
}

/// Index band the way the upstream API assigns it.
pub fn band_for(intensity: u32) -> CarbonIndex {
    match intensity {
        0..=59 => CarbonIndex::VeryLow,
        60..=159 => CarbonIndex::Low,
        160..=249 => CarbonIndex::Moderate,
        250..=329 => CarbonIndex::High,
        _ => CarbonIndex::VeryHigh,
    }
}

/// Contiguous series starting at `t0()` with one period per value.
pub fn series(values: &[u32]) -> ForecastSeries {
    let periods = values
        .iter()
        .enumerate()
        .map(|(i, v)| IntensityPeriod::new(at_min(30 * i as i64), *v, band_for(*v)))
        .collect();
    ForecastSeries::new(periods).unwrap()
}

/// Full day at `t0()` with a single overnight trough (48 periods).
pub fn daily_series() -> ForecastSeries {
    let values: Vec<u32> = (0..48)
        .map(|i| match i {
            4..=9 => 80 + (i as u32 % 3) * 5,
            34..=39 => 320,
            _ => 200 + (i as u32 % 5) * 10,
        })
        .collect();
    series(&values)
}

/// Scripted [`ForecastSource`] that counts its calls.
///
/// Returns `responses` in order, repeating the last one; each call first
/// sleeps for `delay`. Every requested range is recorded.
pub struct StubSource {
    responses: Vec<Result<ForecastSeries, SourceError>>,
    delay: StdDuration,
    calls: AtomicUsize,
    ranges: Mutex<Vec<ForecastRange>>,
}

impl StubSource {
    pub fn ok(series: ForecastSeries) -> Self {
        Self::scripted(vec![Ok(series)])
    }

    pub fn failing(err: SourceError) -> Self {
        Self::scripted(vec![Err(err)])
    }

    pub fn scripted(responses: Vec<Result<ForecastSeries, SourceError>>) -> Self {
        Self {
            responses,
            delay: StdDuration::ZERO,
            calls: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Range passed to the most recent fetch.
    pub fn last_range(&self) -> Option<ForecastRange> {
        self.ranges.lock().last().copied()
    }
}

#[async_trait]
impl ForecastSource for StubSource {
    async fn fetch(&self, range: ForecastRange) -> Result<ForecastSeries, SourceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.ranges.lock().push(range);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let i = n.min(self.responses.len() - 1);
        self.responses[i].clone()
    }
}

/// Cache config with a 30-minute TTL and a 1 ms retry backoff.
pub fn fast_cache_config() -> CacheConfig {
    CacheConfig {
        ttl_minutes: 30,
        retry_backoff_ms: 1,
    }
}

/// A scheduler wired to `source`, with the clock parked at `now`.
pub struct Harness {
    pub source: Arc<StubSource>,
    pub clock: Arc<ManualClock>,
    pub cache: ForecastCache,
    pub scheduler: Scheduler,
}

impl Harness {
    pub fn new(source: StubSource, now: DateTime<Utc>) -> Self {
        let source = Arc::new(source);
        let clock = Arc::new(ManualClock::new(now));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let cache = ForecastCache::new(source.clone(), dyn_clock.clone(), &fast_cache_config());
        let scheduler = Scheduler::new(cache.clone(), dyn_clock, SchedulingConfig::default());
        Self {
            source,
            clock,
            cache,
            scheduler,
        }
    }
}
