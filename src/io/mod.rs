//! File export of schedule results.

pub mod export;
