//! Window scanning and the scheduling engine.

/// Request orchestration and result shaping.
pub mod engine;
/// Incremental sliding-window ranking.
pub mod scanner;
pub mod types;

pub use engine::Scheduler;
pub use scanner::WindowScanner;
pub use types::{
    Confidence, Priority, ScheduleMetadata, ScheduleRequest, ScheduleResult, Window,
};
