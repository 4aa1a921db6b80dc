//! TTL cache of forecast series with coalesced upstream fetches.
//!
//! Entries are keyed by [`ForecastRange`] and held as `Arc<CacheEntry>`; a
//! refetch swaps the `Arc` under the lock, so readers hold either the old
//! entry or the new one and never a partially written series.
//!
//! Each upstream fetch runs in its own spawned task and publishes its outcome
//! on a `watch` channel. Concurrent callers for the same range subscribe to
//! that channel instead of fetching again. A caller that goes away does not
//! abort the task, so the cache is still populated for everyone else.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;

use super::source::ForecastSource;
use super::types::{ForecastRange, ForecastSeries};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::{CacheError, SourceError};

/// A fetched series and when it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Date range the series was requested for.
    pub range: ForecastRange,
    /// The series as returned by the source.
    pub series: ForecastSeries,
    /// Instant the fetch completed.
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Time elapsed since the fetch, never negative.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).max(Duration::zero())
    }

    /// Whole minutes elapsed since the fetch.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        self.age(now).num_minutes()
    }

    /// An entry is stale once its age exceeds `ttl`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) > ttl
    }
}

/// Point-in-time counters for cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Requests served from a fresh entry.
    pub hits: u64,
    /// Requests that started a new fetch.
    pub misses: u64,
    /// Requests that joined a fetch already in flight.
    pub coalesced: u64,
    /// Calls made to the forecast source, retries included.
    pub upstream_calls: u64,
}

type FetchOutcome = Result<Arc<CacheEntry>, CacheError>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<ForecastRange, Arc<CacheEntry>>,
    in_flight: HashMap<ForecastRange, watch::Receiver<Option<FetchOutcome>>>,
}

impl CacheState {
    /// Freshest non-stale entry for `range` or any range containing it.
    fn lookup(
        &self,
        range: &ForecastRange,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Option<Arc<CacheEntry>> {
        if let Some(entry) = self.entries.get(range) {
            if !entry.is_stale(now, ttl) {
                return Some(Arc::clone(entry));
            }
        }
        self.entries
            .values()
            .filter(|e| e.range.contains(range) && !e.is_stale(now, ttl))
            .max_by_key(|e| e.fetched_at)
            .cloned()
    }

    fn purge_stale(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_stale(now, ttl));
        before - self.entries.len()
    }
}

struct Shared {
    state: Mutex<CacheState>,
    source: Arc<dyn ForecastSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    retry_backoff: std::time::Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    upstream_calls: AtomicU64,
}

/// Forecast cache shared by all scheduling requests.
///
/// Cloning is cheap and every clone sees the same entries.
#[derive(Clone)]
pub struct ForecastCache {
    shared: Arc<Shared>,
}

impl ForecastCache {
    /// Creates an empty cache in front of `source`.
    ///
    /// # Arguments
    ///
    /// * `source` - Upstream forecast supplier
    /// * `clock` - Time source used to age entries
    /// * `config` - TTL and retry backoff
    pub fn new(
        source: Arc<dyn ForecastSource>,
        clock: Arc<dyn Clock>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CacheState::default()),
                source,
                clock,
                ttl: config.ttl(),
                retry_backoff: config.retry_backoff(),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
                upstream_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Maximum age at which an entry is still served.
    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    /// Returns a fresh series covering `range`, fetching it if necessary.
    ///
    /// A cached entry for `range` or for any wider range is served while it
    /// is no older than the TTL. Otherwise a single fetch per range is
    /// started and every concurrent caller awaits its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::SourceUnavailable`] to every waiter when the
    /// fetch fails after its single retry.
    pub async fn get(&self, range: ForecastRange) -> Result<Arc<CacheEntry>, CacheError> {
        let mut rx = {
            let mut state = self.shared.state.lock();
            let now = self.shared.clock.now();

            if let Some(entry) = state.lookup(&range, now, self.shared.ttl) {
                self.shared.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%range, age_minutes = entry.age_minutes(now), "Forecast cache hit");
                return Ok(entry);
            }

            // A receiver whose sender is gone belongs to a fetch task that died
            // without reporting; start over rather than wait on it.
            match state.in_flight.get(&range) {
                Some(rx) if rx.has_changed().is_ok() => {
                    self.shared.coalesced.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%range, "Joining in-flight forecast fetch");
                    rx.clone()
                }
                _ => {
                    self.shared.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%range, "Forecast cache miss, fetching");
                    let (tx, rx) = watch::channel(None);
                    state.in_flight.insert(range, rx.clone());
                    self.spawn_fetch(range, tx);
                    rx
                }
            }
        };

        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map(|value| value.clone())
            .map_err(|_| {
                CacheError::SourceUnavailable(format!(
                    "fetch for {range} ended without a result"
                ))
            })?;

        outcome.unwrap_or_else(|| {
            Err(CacheError::SourceUnavailable(format!(
                "fetch for {range} ended without a result"
            )))
        })
    }

    /// Drops every stale entry and returns how many were removed.
    pub fn purge_stale(&self) -> usize {
        let now = self.shared.clock.now();
        self.shared.state.lock().purge_stale(now, self.shared.ttl)
    }

    /// Drops every entry regardless of age and returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        count
    }

    /// Number of stored entries, fresh or stale.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            coalesced: self.shared.coalesced.load(Ordering::Relaxed),
            upstream_calls: self.shared.upstream_calls.load(Ordering::Relaxed),
        }
    }

    fn spawn_fetch(&self, range: ForecastRange, tx: watch::Sender<Option<FetchOutcome>>) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let outcome = shared.fetch_with_retry(range).await;
            {
                let mut state = shared.state.lock();
                if let Ok(entry) = &outcome {
                    state.entries.insert(range, Arc::clone(entry));
                    let now = shared.clock.now();
                    let purged = state.purge_stale(now, shared.ttl);
                    tracing::info!(
                        %range,
                        periods = entry.series.len(),
                        purged,
                        "Stored fresh forecast"
                    );
                }
                state.in_flight.remove(&range);
            }
            tx.send_replace(Some(outcome));
        });
    }
}

impl Shared {
    async fn fetch_with_retry(&self, range: ForecastRange) -> FetchOutcome {
        let series = match self.call_source(range).await {
            Ok(series) => series,
            Err(err) if err.is_retryable() => {
                let delay = jittered(self.retry_backoff);
                tracing::warn!(%range, error = %err, delay_ms = delay.as_millis() as u64, "Forecast fetch failed, retrying once");
                tokio::time::sleep(delay).await;
                self.call_source(range)
                    .await
                    .map_err(|e| unavailable(range, &e))?
            }
            Err(err) => return Err(unavailable(range, &err)),
        };

        Ok(Arc::new(CacheEntry {
            range,
            series,
            fetched_at: self.clock.now(),
        }))
    }

    async fn call_source(&self, range: ForecastRange) -> Result<ForecastSeries, SourceError> {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        let series = self.source.fetch(range).await?;
        if series.is_empty() {
            return Err(SourceError::Malformed(format!(
                "source returned no periods for {range}"
            )));
        }
        Ok(series)
    }
}

fn unavailable(range: ForecastRange, err: &SourceError) -> CacheError {
    tracing::warn!(%range, error = %err, "Forecast source unavailable");
    CacheError::SourceUnavailable(err.to_string())
}

/// `base` plus up to half of it again, so retries from many callers spread out.
fn jittered(base: std::time::Duration) -> std::time::Duration {
    let base_ms = base.as_millis() as u64;
    if base_ms == 0 {
        return base;
    }
    let extra = rand::rng().random_range(0..=base_ms / 2);
    std::time::Duration::from_millis(base_ms + extra)
}
