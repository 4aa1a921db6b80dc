//! Carbon-aware job scheduling over a half-hourly grid intensity forecast.

#[cfg(feature = "api")]
pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod forecast;
pub mod io;
pub mod schedule;
