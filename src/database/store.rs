//! # Queue Store
//!
//! Persistence boundary of the engine. Every mutating method is one atomic
//! unit: the implementation takes the row locks it needs, validates against
//! the state machine while holding them, applies the status change together
//! with the counter binding, and commits or rolls back as a whole.
//!
//! Two implementations ship with the crate:
//!
//! - [`PgQueueStore`](super::postgres::PgQueueStore): Postgres via sqlx, row
//!   locks with `FOR UPDATE` / `FOR UPDATE SKIP LOCKED`
//! - [`MemoryQueueStore`](super::memory::MemoryQueueStore): single-lock
//!   in-memory store for embedding and tests

use crate::calendar::BusinessDay;
use crate::error::QueueResult;
use crate::models::{
    Counter, Customer, CustomerHistoryRecord, DailyQueueSnapshot, NewCustomer, NewQueueEvent,
    QueueEvent, ResetLogEntry,
};
use crate::state_machine::{QueueStateMachine, QueueStatus, Role};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// What happens to counter bindings alongside a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEffect {
    /// Leave counters untouched
    Keep,
    /// Bind the customer to this counter (and unbind it from any other)
    Bind(i64),
    /// Unbind the customer from the counter named by the caller. The counter
    /// actually released is what gets reported; a mismatch is logged.
    Release(i64),
    /// Unbind the customer from whichever counter holds it
    ReleaseAny,
}

/// A single gated status change on one customer row
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub customer_id: i64,
    pub target: QueueStatus,
    pub role: Role,
    /// Precondition on the current status, checked after the edge itself is
    /// validated; unmet means `NotFound`
    pub require_from: Option<Vec<QueueStatus>>,
    pub counter: CounterEffect,
    pub remark: Option<String>,
    pub stamp_served_at: bool,
    /// Upsert the history record for this date in the same transaction
    pub archive_on: Option<NaiveDate>,
}

impl TransitionRequest {
    pub fn new(customer_id: i64, target: QueueStatus, role: Role) -> Self {
        Self {
            customer_id,
            target,
            role,
            require_from: None,
            counter: CounterEffect::Keep,
            remark: None,
            stamp_served_at: false,
            archive_on: None,
        }
    }

    pub fn require_from(mut self, statuses: &[QueueStatus]) -> Self {
        self.require_from = Some(statuses.to_vec());
        self
    }

    pub fn counter(mut self, effect: CounterEffect) -> Self {
        self.counter = effect;
        self
    }

    pub fn remark(mut self, note: impl Into<String>) -> Self {
        self.remark = Some(note.into());
        self
    }

    pub fn stamp_served_at(mut self) -> Self {
        self.stamp_served_at = true;
        self
    }

    pub fn archive_on(mut self, date: NaiveDate) -> Self {
        self.archive_on = Some(date);
        self
    }

    /// Checks the precondition against a status read under lock
    pub fn precondition_holds(&self, current: QueueStatus) -> bool {
        self.require_from
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&current))
    }
}

/// Result of a committed status change
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTransition {
    /// Customer as committed
    pub customer: Customer,
    pub previous_status: QueueStatus,
    /// `updated_at` before the change, i.e. the time of the last status change
    pub previous_updated_at: DateTime<Utc>,
    pub counter_id: Option<i64>,
    /// 1-based rank in the waiting list at selection time (call_next only)
    pub queue_position: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResetRequest {
    pub reason: String,
    pub day: BusinessDay,
}

/// A customer moved by a bulk reset
#[derive(Debug, Clone, PartialEq)]
pub struct ResetCustomer {
    pub customer: Customer,
    pub previous_status: QueueStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResetOutcome {
    pub cancelled: Vec<ResetCustomer>,
    pub completed: Vec<ResetCustomer>,
    /// Customers whose history row for the day was written
    pub archived: Vec<i64>,
    /// Customers whose history upsert failed; the reset went ahead without them
    pub archive_failures: Vec<i64>,
    pub counters_cleared: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeCounts {
    pub history: u64,
    pub events: u64,
    pub snapshots: u64,
    pub reset_logs: u64,
}

impl PurgeCounts {
    pub fn total(&self) -> u64 {
        self.history + self.events + self.snapshots + self.reset_logs
    }
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Creation hook used by the customer collaborator; seeds a WAITING row
    async fn insert_customer(&self, customer: NewCustomer) -> QueueResult<Customer>;

    async fn find_customer(&self, customer_id: i64) -> QueueResult<Option<Customer>>;

    /// Customers in any of `statuses` (all when empty), in priority order
    async fn list_customers(&self, statuses: &[QueueStatus]) -> QueueResult<Vec<Customer>>;

    async fn count_with_status(&self, status: QueueStatus) -> QueueResult<i64>;

    async fn create_counter(&self, name: &str) -> QueueResult<Counter>;

    async fn set_counter_active(&self, counter_id: i64, is_active: bool) -> QueueResult<Counter>;

    async fn find_counter(&self, counter_id: i64) -> QueueResult<Option<Counter>>;

    async fn list_counters(&self) -> QueueResult<Vec<Counter>>;

    /// Lock the lowest-key WAITING customer (skipping rows locked by concurrent
    /// selectors), mark it SERVING and bind it to the counter.
    /// `None` when nobody is waiting.
    async fn claim_next(
        &self,
        counter_id: i64,
        role: &Role,
        machine: &QueueStateMachine,
    ) -> QueueResult<Option<AppliedTransition>>;

    /// Apply one gated status change under a row lock
    async fn transition(
        &self,
        request: TransitionRequest,
        machine: &QueueStateMachine,
    ) -> QueueResult<AppliedTransition>;

    /// Set manual positions 1..n on the listed customers that are WAITING.
    /// Returns the number of rows updated.
    async fn assign_manual_positions(&self, customer_ids: &[i64]) -> QueueResult<u64>;

    /// Bulk end-of-day transition and archival in one transaction
    async fn reset_queue(&self, request: ResetRequest) -> QueueResult<ResetOutcome>;

    async fn insert_queue_event(&self, event: &NewQueueEvent) -> QueueResult<()>;

    async fn list_queue_events(&self, customer_id: Option<i64>) -> QueueResult<Vec<QueueEvent>>;

    async fn list_history(&self, archive_date: NaiveDate)
        -> QueueResult<Vec<CustomerHistoryRecord>>;

    async fn record_reset_attempt(&self, entry: &ResetLogEntry) -> QueueResult<()>;

    async fn successful_reset_on(&self, reset_date: NaiveDate) -> QueueResult<bool>;

    async fn list_reset_attempts(&self, reset_date: NaiveDate) -> QueueResult<Vec<ResetLogEntry>>;

    /// Recompute and upsert the totals row for `day`
    async fn refresh_daily_snapshot(&self, day: BusinessDay) -> QueueResult<DailyQueueSnapshot>;

    async fn find_daily_snapshot(&self, date: NaiveDate) -> QueueResult<Option<DailyQueueSnapshot>>;

    /// Delete history, snapshot and reset-log rows dated before `cutoff_date`
    /// and events created before `cutoff_at`
    async fn purge_before(
        &self,
        cutoff_date: NaiveDate,
        cutoff_at: DateTime<Utc>,
    ) -> QueueResult<PurgeCounts>;
}
