use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One scheduler attempt at the daily reset. Maps to `daily_reset_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ResetLogEntry {
    pub reset_date: NaiveDate,
    pub success: bool,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ResetLogEntry {
    pub fn success(reset_date: NaiveDate, duration_ms: i64) -> Self {
        Self {
            reset_date,
            success: true,
            duration_ms,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn failure(reset_date: NaiveDate, duration_ms: i64, error: impl Into<String>) -> Self {
        Self {
            reset_date,
            success: false,
            duration_ms,
            error: Some(error.into()),
            created_at: Utc::now(),
        }
    }
}
