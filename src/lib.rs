#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Queue Core
//!
//! Queue lifecycle engine for walk-in service counters.
//!
//! ## Overview
//!
//! Customers join a single shared queue, are ranked by priority class and
//! arrival time, and move through `WAITING → SERVING → PROCESSING → COMPLETED`
//! (or `CANCELLED`) as counter staff call and serve them. At local midnight
//! the day is closed out: open customers are completed or cancelled, counters
//! are freed and every customer of the day is archived to history.
//!
//! ## Key Features
//!
//! - **Priority ordering**: senior citizen > PWD > pregnant > regular, with
//!   manual staff positions taking precedence
//! - **Gated transitions**: a static transition table plus a role capability table
//! - **Row-locked calling**: concurrent `call_next` on the same queue never
//!   hands one customer to two counters
//! - **Best-effort side channels**: analytics and realtime notifications run
//!   after commit and never fail the operation that caused them
//! - **Idempotent archival**: history rows are upserts keyed by customer and date
//!
//! ## Module Organization
//!
//! - [`queue`] - Ordering policy, counter operations and the archival coordinator
//! - [`state_machine`] - Queue status transitions and role capabilities
//! - [`database`] - Store trait with PostgreSQL and in-memory backends
//! - [`events`] - Analytics and realtime sinks plus the async dispatcher
//! - [`scheduler`] - Daily reset and weekly retention cleanup
//! - [`models`] - Row types
//! - [`calendar`] - Business-day arithmetic in the outlet timezone
//! - [`config`] - Configuration loading
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use queue_core::calendar::BusinessCalendar;
//! use queue_core::database::MemoryQueueStore;
//! use queue_core::events::{BroadcastRealtimeSink, SideChannelDispatcher, StoreAnalyticsSink};
//! use queue_core::models::{NewCustomer, PriorityFlags};
//! use queue_core::queue::QueueOperations;
//! use queue_core::state_machine::Role;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryQueueStore::new());
//! let dispatcher = SideChannelDispatcher::spawn(
//!     Arc::new(StoreAnalyticsSink::new(store.clone())),
//!     Arc::new(BroadcastRealtimeSink::default()),
//! );
//! let calendar = BusinessCalendar::from_offset_str("+08:00", "Asia/Manila")?;
//! let ops = QueueOperations::new(store.clone(), dispatcher, calendar);
//!
//! let counter = ops.create_counter("Counter 1", &Role::Admin).await?;
//! ops.register_customer(NewCustomer::new("Ana").with_flags(PriorityFlags::senior()))
//!     .await?;
//!
//! if let Some(customer) = ops.call_next(counter.id, &Role::Cashier).await? {
//!     println!("Now serving {}", customer.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod calendar;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod state_machine;

pub use calendar::{BusinessCalendar, BusinessDay};
pub use config::{ConfigLoader, ConfigurationError, QueueConfig};
pub use database::{MemoryQueueStore, PgQueueStore, QueueStore};
pub use error::{QueueError, QueueResult};
pub use events::{BroadcastRealtimeSink, SideChannelDispatcher, StoreAnalyticsSink};
pub use models::{Counter, Customer, NewCustomer, PriorityFlags};
pub use queue::{ArchivalCoordinator, QueueOperations, ResetSummary};
pub use scheduler::{DailyResetScheduler, SchedulerConfig};
pub use state_machine::{QueueStateMachine, QueueStatus, Role};
