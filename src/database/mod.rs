//! # Database Operations
//!
//! Persistence for customers, counters, the event log, daily history and the
//! reset log.
//!
//! ## Key Components
//!
//! - [`store`] - The [`QueueStore`] trait every backend implements
//! - [`postgres`] - PostgreSQL backend with row locking and savepoint-isolated archival
//! - [`memory`] - In-process backend with fault injection for tests
//! - [`connection`] - Pool construction and health checks
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use queue_core::config::DatabaseConfig;
//! use queue_core::database::{DatabaseConnection, PgQueueStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::connect(&DatabaseConfig::default()).await?;
//! let store = PgQueueStore::new(db.pool().clone());
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod memory;
pub mod postgres;
pub mod store;

pub use connection::DatabaseConnection;
pub use memory::MemoryQueueStore;
pub use postgres::PgQueueStore;
pub use store::{
    AppliedTransition, CounterEffect, PurgeCounts, QueueStore, ResetCustomer, ResetOutcome,
    ResetRequest, TransitionRequest,
};
