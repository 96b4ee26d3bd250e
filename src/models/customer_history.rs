use super::customer::{Customer, PriorityFlags};
use crate::state_machine::QueueStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Archived snapshot of a customer, unique on (original_customer_id, archive_date).
/// Re-archiving the same customer on the same date overwrites the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerHistoryRecord {
    pub original_customer_id: i64,
    pub name: String,
    pub contact: Option<String>,
    pub queue_status: QueueStatus,
    pub token_number: Option<i32>,
    pub priority_flags: PriorityFlags,
    pub created_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
    pub archive_date: NaiveDate,
}

impl CustomerHistoryRecord {
    /// Snapshot `customer` as it leaves the queue with `final_status`
    pub fn from_customer(
        customer: &Customer,
        final_status: QueueStatus,
        archive_date: NaiveDate,
        archived_at: DateTime<Utc>,
    ) -> Self {
        Self {
            original_customer_id: customer.id,
            name: customer.name.clone(),
            contact: customer.contact.clone(),
            queue_status: final_status,
            token_number: customer.token_number,
            priority_flags: customer.priority_flags,
            created_at: customer.created_at,
            archived_at,
            archive_date,
        }
    }

    pub fn key(&self) -> (i64, NaiveDate) {
        (self.original_customer_id, self.archive_date)
    }
}
