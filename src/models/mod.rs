//! # Data Models
//!
//! Rows owned or touched by the queue engine:
//!
//! - [`Customer`] - live queue entry (`customers`)
//! - [`Counter`] - service counter and its current binding (`counters`)
//! - [`NewQueueEvent`] - append-only analytics event (`queue_events`)
//! - [`CustomerHistoryRecord`] - daily archive snapshot (`customer_history`)
//! - [`ResetLogEntry`] - scheduler attempt log (`daily_reset_log`)
//! - [`DailyQueueSnapshot`] - per-day totals (`daily_queue_history`)

pub mod counter;
pub mod customer;
pub mod customer_history;
pub mod daily_snapshot;
pub mod queue_event;
pub mod reset_log;

pub use counter::Counter;
pub use customer::{Customer, CustomerSnapshot, NewCustomer, PriorityFlags};
pub use customer_history::CustomerHistoryRecord;
pub use daily_snapshot::DailyQueueSnapshot;
pub use queue_event::{NewQueueEvent, QueueEvent, QueueEventType};
pub use reset_log::ResetLogEntry;
