use chrono::{DateTime, Duration, Utc};
use queue_core::models::{Customer, NewCustomer, PriorityFlags};
use queue_core::queue::QueueOperations;
use queue_core::state_machine::QueueStatus;

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

/// Register a customer who joined `minutes` ago
pub async fn join(
    ops: &QueueOperations,
    name: &str,
    flags: PriorityFlags,
    minutes: i64,
) -> Customer {
    ops.register_customer(
        NewCustomer::new(name)
            .with_flags(flags)
            .created_at(minutes_ago(minutes)),
    )
    .await
    .expect("customer should register")
}

/// Unsaved customer row for pure ordering checks
pub fn waiting_customer(
    id: i64,
    flags: PriorityFlags,
    created_at: DateTime<Utc>,
    manual_position: Option<i32>,
) -> Customer {
    Customer {
        id,
        name: format!("customer-{id}"),
        contact: None,
        token_number: i32::try_from(id).ok(),
        or_number: None,
        priority_flags: flags,
        manual_position,
        queue_status: QueueStatus::Waiting,
        created_at,
        updated_at: created_at,
        served_at: None,
        remarks: None,
    }
}
