//! Error kinds for each layer of the scheduler.
//!
//! Errors flow upward and are narrowed at each boundary: the forecast source
//! reports transport detail, the cache collapses it into a single
//! unavailability kind, and the engine exposes the caller-facing taxonomy.

use thiserror::Error;

/// Failure reported by a [`ForecastSource`](crate::forecast::ForecastSource).
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed forecast payload: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Whether a second attempt could plausibly succeed.
    ///
    /// Malformed payloads and client-side API errors are deterministic, so
    /// retrying them only adds latency.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::RateLimited => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Malformed(err.to_string())
    }
}

/// Failure surfaced by the [`ForecastCache`](crate::forecast::ForecastCache).
///
/// `Clone` because a single failed fetch is delivered to every coalesced waiter.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("forecast source unavailable: {0}")]
    SourceUnavailable(String),
}

/// Failure surfaced by the [`WindowScanner`](crate::schedule::WindowScanner).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("no viable window: {0}")]
    NoViableWindow(String),
}

/// Caller-facing error taxonomy returned by the [`Scheduler`](crate::schedule::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Caller input violates constraints. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream forecast outage; the caller should try again later.
    #[error("scheduling unavailable: {0}")]
    SchedulingUnavailable(String),

    /// Well-formed request, but no window satisfies the deadline and duration.
    #[error("no viable window: {0}")]
    NoViableWindow(String),

    /// The caller cancelled the request while it was waiting on a fetch.
    #[error("request cancelled")]
    Cancelled,
}

impl From<CacheError> for ScheduleError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::SourceUnavailable(msg) => ScheduleError::SchedulingUnavailable(msg),
        }
    }
}

impl From<ScanError> for ScheduleError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::NoViableWindow(msg) => ScheduleError::NoViableWindow(msg),
        }
    }
}
