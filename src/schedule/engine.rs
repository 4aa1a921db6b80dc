//! Scheduling engine: request validation, forecast lookup, window selection.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use super::scanner::WindowScanner;
use super::types::{Confidence, ScheduleMetadata, ScheduleRequest, ScheduleResult, Window};
use crate::clock::Clock;
use crate::config::SchedulingConfig;
use crate::error::ScheduleError;
use crate::forecast::types::{ceil_to_period, floor_to_period};
use crate::forecast::{CacheEntry, ForecastCache, ForecastRange};

/// Single entry point that turns a [`ScheduleRequest`] into a [`ScheduleResult`].
///
/// Holds the shared [`ForecastCache`]; everything else is per-request and
/// computed synchronously once the forecast is in hand.
#[derive(Clone)]
pub struct Scheduler {
    cache: ForecastCache,
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
    scanner: WindowScanner,
}

impl Scheduler {
    /// Creates an engine over `cache`.
    ///
    /// # Arguments
    ///
    /// * `cache` - Shared forecast cache
    /// * `clock` - Time source; should be the same one the cache uses
    /// * `config` - Duration limits, alternative count, and forecast horizon
    pub fn new(cache: ForecastCache, clock: Arc<dyn Clock>, config: SchedulingConfig) -> Self {
        Self {
            cache,
            clock,
            config,
            scanner: WindowScanner,
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &ForecastCache {
        &self.cache
    }

    /// Finds the lowest-carbon window for `request`.
    ///
    /// # Errors
    ///
    /// * [`ScheduleError::InvalidRequest`] - duration outside the configured
    ///   limits or deadline not in the future
    /// * [`ScheduleError::NoViableWindow`] - no window fits before the deadline
    /// * [`ScheduleError::SchedulingUnavailable`] - the forecast could not be fetched
    pub async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleResult, ScheduleError> {
        self.schedule_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`Scheduler::schedule`], but returns [`ScheduleError::Cancelled`]
    /// as soon as `cancel` fires while waiting for the forecast.
    ///
    /// A fetch already in flight keeps running and still populates the cache.
    ///
    /// # Errors
    ///
    /// As [`Scheduler::schedule`], plus [`ScheduleError::Cancelled`].
    pub async fn schedule_with_cancel(
        &self,
        request: &ScheduleRequest,
        cancel: &CancellationToken,
    ) -> Result<ScheduleResult, ScheduleError> {
        let now = self.clock.now();
        self.validate(request, now)?;

        let duration = Duration::minutes(i64::from(request.duration_minutes));
        if now + duration > request.deadline {
            return Err(ScheduleError::NoViableWindow(format!(
                "{} minutes do not fit before the deadline {}",
                request.duration_minutes, request.deadline
            )));
        }

        let requested = ForecastRange::spanning(now, request.deadline);
        let (range, truncated) = requested.clamp_days(self.config.max_forecast_days);
        if truncated {
            tracing::info!(%requested, %range, "Deadline lies beyond the forecast horizon");
        }
        tracing::info!(
            duration_minutes = request.duration_minutes,
            deadline = %request.deadline,
            priority = ?request.priority,
            job = request.job_name.as_deref().unwrap_or("-"),
            "Scheduling job"
        );

        let entry = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(%range, "Scheduling request cancelled while awaiting forecast");
                return Err(ScheduleError::Cancelled);
            }
            entry = self.cache.get(range) => entry?,
        };

        // The fetch may have taken a while; judge feasibility and age from here.
        let now = self.clock.now();
        let ranked = self.scanner.scan(
            &entry.series,
            request.duration_minutes,
            now,
            request.deadline,
        )?;

        let result = self.shape_result(request, range, &entry, ranked, now)?;
        tracing::info!(
            start = %result.primary.start,
            average_intensity = result.primary.average_intensity,
            alternatives = result.alternatives.len(),
            confidence = ?result.metadata.confidence,
            "Selected schedule window"
        );
        Ok(result)
    }

    /// Returns the cached forecast for `range`, fetching it if needed.
    ///
    /// The range is clamped to the configured forecast horizon.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::SchedulingUnavailable`] if the forecast
    /// cannot be fetched.
    pub async fn forecast(&self, range: ForecastRange) -> Result<Arc<CacheEntry>, ScheduleError> {
        let (range, _) = range.clamp_days(self.config.max_forecast_days);
        Ok(self.cache.get(range).await?)
    }

    fn validate(&self, request: &ScheduleRequest, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        let min = self.config.min_duration_minutes;
        let max = self.config.max_duration_minutes;
        if request.duration_minutes < min {
            return Err(ScheduleError::InvalidRequest(format!(
                "duration must be at least {min} minutes, got {}",
                request.duration_minutes
            )));
        }
        if request.duration_minutes > max {
            return Err(ScheduleError::InvalidRequest(format!(
                "duration cannot exceed {max} minutes, got {}",
                request.duration_minutes
            )));
        }
        if request.deadline <= now {
            return Err(ScheduleError::InvalidRequest(format!(
                "deadline {} must be in the future",
                request.deadline
            )));
        }
        Ok(())
    }

    fn shape_result(
        &self,
        request: &ScheduleRequest,
        range: ForecastRange,
        entry: &CacheEntry,
        ranked: Vec<Window>,
        now: DateTime<Utc>,
    ) -> Result<ScheduleResult, ScheduleError> {
        let Some(primary) = ranked.first().cloned() else {
            return Err(ScheduleError::NoViableWindow(
                "scan produced no windows".to_string(),
            ));
        };
        let periods_analyzed = ranked.len();
        let alternatives = select_alternatives(&ranked, self.config.max_alternatives);

        // Served up to and including the TTL, but only trusted strictly under it.
        let fresh = entry.age(now) < self.cache.ttl();
        let span_start = ceil_to_period(now);
        let span_end = floor_to_period(request.deadline);
        let gaps = entry.series.uncovered(span_start, span_end);
        if !gaps.is_empty() {
            tracing::info!(?gaps, "Forecast does not cover the full requested span");
        }
        let confidence = if fresh && gaps.is_empty() {
            Confidence::High
        } else {
            Confidence::Low
        };

        Ok(ScheduleResult {
            metadata: ScheduleMetadata {
                periods_analyzed,
                cache_age_minutes: entry.age_minutes(now),
                confidence,
                requested_duration_minutes: request.duration_minutes,
                window_duration_minutes: primary.duration_minutes() as u32,
                forecast_range: range,
                priority: request.priority,
            },
            primary,
            alternatives,
        })
    }
}

/// Picks up to `max` alternatives from `ranked[1..]`, best-first.
///
/// Windows that overlap neither the primary nor an already chosen alternative
/// are taken first, in rank order. Remaining slots are then filled with
/// overlapping windows, again in rank order.
pub fn select_alternatives(ranked: &[Window], max: usize) -> Vec<Window> {
    let Some((primary, rest)) = ranked.split_first() else {
        return Vec::new();
    };

    let mut chosen: Vec<usize> = Vec::with_capacity(max);
    for (i, candidate) in rest.iter().enumerate() {
        if chosen.len() == max {
            break;
        }
        let clear = !candidate.overlaps(primary)
            && chosen.iter().all(|&j| !candidate.overlaps(&rest[j]));
        if clear {
            chosen.push(i);
        }
    }
    for i in 0..rest.len() {
        if chosen.len() == max {
            break;
        }
        if !chosen.contains(&i) {
            chosen.push(i);
        }
    }

    chosen.sort_unstable();
    chosen.into_iter().map(|i| rest[i].clone()).collect()
}
