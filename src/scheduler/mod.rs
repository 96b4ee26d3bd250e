//! # Scheduler
//!
//! Timer-driven maintenance: the midnight queue reset and the weekly
//! retention cleanup.

pub mod daily_reset;

pub use daily_reset::{
    DailyResetScheduler, ResetPipeline, ResetRunOutcome, SchedulerConfig, SchedulerStatus,
};
