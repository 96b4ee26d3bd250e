use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-day queue totals kept in `daily_queue_history`, refreshed on every
/// analytics recompute for that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DailyQueueSnapshot {
    pub date: NaiveDate,
    pub total_customers: i64,
    pub waiting_customers: i64,
    pub serving_customers: i64,
    pub processing_customers: i64,
    pub completed_customers: i64,
    pub cancelled_customers: i64,
    pub priority_customers: i64,
    pub avg_wait_minutes: f64,
    pub updated_at: DateTime<Utc>,
}
