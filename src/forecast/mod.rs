//! Forecast data, the upstream source contract, and the forecast cache.

/// TTL cache with coalesced fetches.
pub mod cache;
/// GB Carbon Intensity API client.
pub mod carbon_api;
pub mod source;
pub mod types;

pub use cache::{CacheEntry, CacheStats, ForecastCache};
pub use carbon_api::CarbonIntensityClient;
pub use source::ForecastSource;
pub use types::{CarbonIndex, ForecastRange, ForecastSeries, IntensityPeriod};
