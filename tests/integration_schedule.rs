//! End-to-end scheduling through the cache and engine with a stub source.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate};
use tokio_util::sync::CancellationToken;

use common::{Harness, StubSource, at_min, daily_series, series, t0};
use green_sched::error::{ScheduleError, SourceError};
use green_sched::forecast::{ForecastRange, ForecastSeries};
use green_sched::schedule::{Confidence, ScheduleRequest};

#[tokio::test]
async fn worked_example_end_to_end() {
    let h = Harness::new(StubSource::ok(series(&[200, 150, 100, 300])), t0());

    let result = h
        .scheduler
        .schedule(&ScheduleRequest::new(60, at_min(120)))
        .await
        .unwrap();

    assert_eq!(result.primary.start, at_min(30));
    assert_eq!(result.primary.end, at_min(90));
    assert_eq!(result.primary.average_intensity, 125.0);

    let alts: Vec<_> = result
        .alternatives
        .iter()
        .map(|w| (w.start, w.average_intensity))
        .collect();
    assert_eq!(alts, vec![(at_min(0), 175.0), (at_min(60), 200.0)]);

    assert_eq!(result.metadata.periods_analyzed, 3);
    assert_eq!(result.metadata.cache_age_minutes, 0);
    assert_eq!(result.metadata.confidence, Confidence::High);
    assert_eq!(h.source.calls(), 1);
}

#[tokio::test]
async fn repeated_requests_are_deterministic_and_cached() {
    let h = Harness::new(StubSource::ok(daily_series()), t0());
    let req = ScheduleRequest::new(180, at_min(24 * 60));

    let first = h.scheduler.schedule(&req).await.unwrap();
    let second = h.scheduler.schedule(&req).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.source.calls(), 1);
    assert_eq!(h.cache.stats().hits, 1);
}

#[tokio::test]
async fn daily_trough_wins_and_alternatives_do_not_overlap() {
    let h = Harness::new(StubSource::ok(daily_series()), t0());

    let result = h
        .scheduler
        .schedule(&ScheduleRequest::new(180, at_min(24 * 60)))
        .await
        .unwrap();

    assert_eq!(result.primary.start, at_min(120));
    assert_eq!(result.primary.average_intensity, 85.0);
    assert_eq!(result.alternatives.len(), 3);
    for (i, alt) in result.alternatives.iter().enumerate() {
        assert!(!alt.overlaps(&result.primary));
        for other in &result.alternatives[i + 1..] {
            assert!(!alt.overlaps(other));
        }
    }
    for pair in result.alternatives.windows(2) {
        assert!(pair[0].average_intensity <= pair[1].average_intensity);
    }
    assert_eq!(result.metadata.confidence, Confidence::High);
}

#[tokio::test]
async fn equal_averages_prefer_earliest_start() {
    let h = Harness::new(StubSource::ok(series(&[100, 300, 100, 300, 100, 300])), t0());

    let result = h
        .scheduler
        .schedule(&ScheduleRequest::new(60, at_min(180)))
        .await
        .unwrap();

    assert_eq!(result.primary.start, t0());
    let starts: Vec<_> = result.alternatives.iter().map(|w| w.start).collect();
    assert_eq!(starts, vec![at_min(30), at_min(60), at_min(120)]);
}

#[tokio::test]
async fn entry_at_ttl_is_served_and_older_is_refetched() {
    let h = Harness::new(StubSource::ok(daily_series()), t0());
    let req = ScheduleRequest::new(60, at_min(24 * 60));

    let result = h.scheduler.schedule(&req).await.unwrap();
    assert_eq!(result.metadata.confidence, Confidence::High);

    // Still served at exactly the TTL, but no longer trusted.
    h.clock.advance(Duration::minutes(30));
    let result = h.scheduler.schedule(&req).await.unwrap();
    assert_eq!(h.source.calls(), 1);
    assert_eq!(result.metadata.cache_age_minutes, 30);
    assert_eq!(result.metadata.confidence, Confidence::Low);

    h.clock.advance(Duration::minutes(1));
    let result = h.scheduler.schedule(&req).await.unwrap();
    assert_eq!(h.source.calls(), 2);
    assert_eq!(result.metadata.cache_age_minutes, 0);
    assert_eq!(result.metadata.confidence, Confidence::High);
}

#[tokio::test]
async fn empty_forecast_is_unavailable_and_not_cached() {
    let h = Harness::new(StubSource::ok(ForecastSeries::default()), t0());
    let req = ScheduleRequest::new(60, at_min(600));

    for expected_calls in 1..=2 {
        let err = h.scheduler.schedule(&req).await.unwrap_err();
        assert!(matches!(err, ScheduleError::SchedulingUnavailable(_)));
        assert_eq!(h.source.calls(), expected_calls);
        assert!(h.cache.is_empty());
    }
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

#[tokio::test]
async fn overnight_deadline_requests_both_days() {
    let h = Harness::new(StubSource::ok(daily_series()), at_min(20 * 60));

    let result = h
        .scheduler
        .schedule(&ScheduleRequest::new(60, at_min(30 * 60)))
        .await
        .unwrap();

    let expected = ForecastRange::new(march(1), march(2));
    assert_eq!(h.source.last_range(), Some(expected));
    assert_eq!(result.metadata.forecast_range, expected);
    assert!(result.primary.start >= at_min(20 * 60));
}

#[tokio::test]
async fn deadline_past_horizon_is_clamped_with_low_confidence() {
    let values: Vec<u32> = (0..3 * 48).map(|i| 150 + (i % 7) * 10).collect();
    let h = Harness::new(StubSource::ok(series(&values)), t0());

    let result = h
        .scheduler
        .schedule(&ScheduleRequest::new(60, t0() + Duration::days(5)))
        .await
        .unwrap();

    let expected = ForecastRange::new(march(1), march(3));
    assert_eq!(h.source.last_range(), Some(expected));
    assert_eq!(result.metadata.forecast_range, expected);
    assert_eq!(result.metadata.confidence, Confidence::Low);
    assert!(result.primary.end <= at_min(3 * 24 * 60));
}

#[tokio::test]
async fn infeasible_deadline_never_touches_the_source() {
    let h = Harness::new(StubSource::ok(daily_series()), t0());

    let err = h
        .scheduler
        .schedule(&ScheduleRequest::new(60, at_min(45)))
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::NoViableWindow(_)));
    assert_eq!(h.source.calls(), 0);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn forecast_ending_early_gives_low_confidence() {
    // Six hours of data against a deadline twelve hours out.
    let h = Harness::new(StubSource::ok(series(&[150; 12])), t0());

    let result = h
        .scheduler
        .schedule(&ScheduleRequest::new(60, at_min(12 * 60)))
        .await
        .unwrap();

    assert_eq!(result.metadata.confidence, Confidence::Low);
    assert!(result.primary.end <= at_min(6 * 60));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_fetch() {
    let source = StubSource::ok(daily_series()).with_delay(StdDuration::from_millis(50));
    let h = Harness::new(source, t0());
    let range = ForecastRange::day(t0().date_naive());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = h.cache.clone();
            tokio::spawn(async move { cache.get(range).await })
        })
        .collect();

    let mut entries = Vec::new();
    for handle in handles {
        entries.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(h.source.calls(), 1);
    assert!(entries.iter().all(|e| Arc::ptr_eq(e, &entries[0])));
    let stats = h.cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced, 9);
    assert_eq!(stats.upstream_calls, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn outage_reaches_every_waiter_after_one_retry() {
    let source = StubSource::failing(SourceError::Network("connection refused".into()))
        .with_delay(StdDuration::from_millis(50));
    let h = Harness::new(source, t0());
    let req = ScheduleRequest::new(60, at_min(24 * 60));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let scheduler = h.scheduler.clone();
            let req = req.clone();
            tokio::spawn(async move { scheduler.schedule(&req).await })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ScheduleError::SchedulingUnavailable(_)));
    }
    assert_eq!(h.source.calls(), 2);
    assert!(h.cache.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_request_leaves_fetch_to_fill_the_cache() {
    let source = StubSource::ok(daily_series()).with_delay(StdDuration::from_millis(100));
    let h = Harness::new(source, t0());
    let req = ScheduleRequest::new(60, at_min(24 * 60));
    let cancel = CancellationToken::new();

    let task = {
        let scheduler = h.scheduler.clone();
        let req = req.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.schedule_with_cancel(&req, &cancel).await })
    };
    tokio::time::sleep(StdDuration::from_millis(10)).await;
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err, ScheduleError::Cancelled);

    tokio::time::sleep(StdDuration::from_millis(250)).await;
    assert_eq!(h.cache.len(), 1);

    h.scheduler.schedule(&req).await.unwrap();
    assert_eq!(h.source.calls(), 1);
}
