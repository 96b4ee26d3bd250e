use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A service counter. At most one counter references a given customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Counter {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub current_customer_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl Counter {
    pub fn is_idle(&self) -> bool {
        self.current_customer_id.is_none()
    }
}
