//! # Archival Coordinator
//!
//! End-of-day reset: every open customer is closed out (WAITING → CANCELLED,
//! SERVING/PROCESSING → COMPLETED), every counter is freed, and the day's
//! customers are copied into `customer_history`. The status changes and
//! archive upserts commit together; a history row that fails to write is
//! logged and reported without undoing the rest of the batch.
//!
//! Archive rows are keyed by (customer, business date), so running the reset
//! again on the same day rewrites the same rows instead of adding new ones.

use crate::calendar::BusinessCalendar;
use crate::database::{QueueStore, ResetOutcome, ResetRequest};
use crate::error::QueueResult;
use crate::events::{QueueResetNotice, RealtimeMessage, SideChannelDispatcher};
use crate::models::{NewQueueEvent, QueueEventType};
use crate::scheduler::ResetPipeline;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const SYSTEM_ADMIN_ID: &str = "system";
pub const DAILY_RESET_REASON: &str = "Daily automatic reset";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub cancelled_count: usize,
    pub completed_count: usize,
    pub archived_count: usize,
    pub archive_failures: usize,
}

impl From<&ResetOutcome> for ResetSummary {
    fn from(outcome: &ResetOutcome) -> Self {
        Self {
            cancelled_count: outcome.cancelled.len(),
            completed_count: outcome.completed.len(),
            archived_count: outcome.archived.len(),
            archive_failures: outcome.archive_failures.len(),
        }
    }
}

pub struct ArchivalCoordinator {
    store: Arc<dyn QueueStore>,
    dispatcher: SideChannelDispatcher,
    calendar: BusinessCalendar,
}

impl std::fmt::Debug for ArchivalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivalCoordinator")
            .field("calendar", &self.calendar)
            .finish_non_exhaustive()
    }
}

impl ArchivalCoordinator {
    pub fn new(
        store: Arc<dyn QueueStore>,
        dispatcher: SideChannelDispatcher,
        calendar: BusinessCalendar,
    ) -> Self {
        Self {
            store,
            dispatcher,
            calendar,
        }
    }

    /// Close out the current business day
    #[instrument(skip(self, reason), fields(admin_id = %admin_id))]
    pub async fn reset_queue(&self, admin_id: &str, reason: &str) -> QueueResult<ResetSummary> {
        let day = self.calendar.today();
        let outcome = self
            .store
            .reset_queue(ResetRequest {
                reason: reason.to_string(),
                day,
            })
            .await?;
        let summary = ResetSummary::from(&outcome);

        if !outcome.archive_failures.is_empty() {
            warn!(
                failed_customer_ids = ?outcome.archive_failures,
                "Reset committed with customers missing from history"
            );
        }

        for moved in &outcome.cancelled {
            let customer = &moved.customer;
            self.dispatcher.record(
                NewQueueEvent::new(customer.id, QueueEventType::Cancelled, customer.is_priority())
                    .with_reason(reason),
            );
        }
        for moved in &outcome.completed {
            let customer = &moved.customer;
            self.dispatcher.record(
                NewQueueEvent::new(customer.id, QueueEventType::Served, customer.is_priority())
                    .with_reason("completed during reset"),
            );
        }

        self.dispatcher.recompute(day);
        self.dispatcher
            .broadcast(RealtimeMessage::QueueReset(QueueResetNotice {
                admin_id: admin_id.to_string(),
                reason: reason.to_string(),
                result: summary,
                timestamp: Utc::now(),
            }));

        info!(
            business_date = %day.date,
            cancelled = summary.cancelled_count,
            completed = summary.completed_count,
            archived = summary.archived_count,
            archive_failures = summary.archive_failures,
            counters_cleared = outcome.counters_cleared,
            "Queue reset completed"
        );

        Ok(summary)
    }
}

#[async_trait]
impl ResetPipeline for ArchivalCoordinator {
    async fn run_reset(&self) -> QueueResult<ResetSummary> {
        self.reset_queue(SYSTEM_ADMIN_ID, DAILY_RESET_REASON).await
    }
}
