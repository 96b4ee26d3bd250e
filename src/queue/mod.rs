//! # Queue
//!
//! Priority ordering, the counter-facing operations and the end-of-day
//! archival pipeline.

pub mod archival;
pub mod operations;
pub mod ordering;

pub use archival::{ArchivalCoordinator, ResetSummary, DAILY_RESET_REASON, SYSTEM_ADMIN_ID};
pub use operations::{QueueEntry, QueueOperations, QueueStatistics, DEFAULT_AVERAGE_SERVICE_MINUTES};
pub use ordering::{ordering_key, priority_weight, sort_by_priority};
