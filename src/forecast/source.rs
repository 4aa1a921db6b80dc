//! Contract for anything that can supply forecast series.

use async_trait::async_trait;

use super::types::{ForecastRange, ForecastSeries};
use crate::error::SourceError;

/// Supplier of half-hourly carbon intensity forecasts.
///
/// Implemented by [`CarbonIntensityClient`](super::CarbonIntensityClient) for
/// the live API and by counting stubs in tests. Implementations own their
/// transport timeout; the cache never imposes one of its own.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Fetches the forecast covering every day in `range`.
    ///
    /// The returned series must be contiguous and on 30-minute boundaries.
    /// It may cover less than `range` when upstream has not published that
    /// far ahead; callers detect this with
    /// [`ForecastSeries::uncovered`](super::ForecastSeries::uncovered).
    async fn fetch(&self, range: ForecastRange) -> Result<ForecastSeries, SourceError>;
}
