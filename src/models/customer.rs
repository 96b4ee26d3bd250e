use crate::error::{QueueError, QueueResult};
use crate::state_machine::QueueStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// Priority flags attached to a customer at registration.
/// Stored as JSONB in `customers.priority_flags` and decoded once here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityFlags {
    pub senior_citizen: bool,
    pub pregnant: bool,
    pub pwd: bool,
}

impl PriorityFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn senior() -> Self {
        Self {
            senior_citizen: true,
            ..Self::default()
        }
    }

    pub fn pwd() -> Self {
        Self {
            pwd: true,
            ..Self::default()
        }
    }

    pub fn pregnant() -> Self {
        Self {
            pregnant: true,
            ..Self::default()
        }
    }

    pub fn any(&self) -> bool {
        self.senior_citizen || self.pregnant || self.pwd
    }
}

/// A customer in the live queue. Maps to the `customers` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub contact: Option<String>,
    pub token_number: Option<i32>,
    pub or_number: Option<String>,
    pub priority_flags: PriorityFlags,
    pub manual_position: Option<i32>,
    pub queue_status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub served_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

impl Customer {
    pub fn is_priority(&self) -> bool {
        self.priority_flags.any()
    }

    /// Append an audit note, keeping earlier remarks ("a | b")
    pub fn append_remark(&mut self, note: &str) {
        self.remarks = Some(join_remarks(self.remarks.as_deref(), note));
    }

    /// Minutes elapsed since `since`, rounded, never negative
    pub fn minutes_since(since: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
        let seconds = (now - since).num_seconds().max(0);
        ((seconds as f64) / 60.0).round() as i32
    }

    pub fn snapshot(&self) -> CustomerSnapshot {
        CustomerSnapshot {
            id: self.id,
            name: self.name.clone(),
            token_number: self.token_number,
            or_number: self.or_number.clone(),
            queue_status: self.queue_status,
            priority_flags: self.priority_flags,
        }
    }
}

pub(crate) fn join_remarks(existing: Option<&str>, note: &str) -> String {
    match existing {
        Some(prev) if !prev.is_empty() => format!("{prev} | {note}"),
        _ => note.to_string(),
    }
}

/// Customer fields carried in realtime payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub id: i64,
    pub name: String,
    pub token_number: Option<i32>,
    pub or_number: Option<String>,
    pub queue_status: QueueStatus,
    pub priority_flags: PriorityFlags,
}

/// Seed for a new waiting customer, handed over by the customer collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub contact: Option<String>,
    pub token_number: Option<i32>,
    pub or_number: Option<String>,
    pub priority_flags: PriorityFlags,
    /// Registration time; defaults to now
    pub created_at: Option<DateTime<Utc>>,
}

impl NewCustomer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact: None,
            token_number: None,
            or_number: None,
            priority_flags: PriorityFlags::none(),
            created_at: None,
        }
    }

    pub fn with_flags(mut self, flags: PriorityFlags) -> Self {
        self.priority_flags = flags;
        self
    }

    pub fn with_token(mut self, token_number: i32) -> Self {
        self.token_number = Some(token_number);
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// Raw `customers` row as read by sqlx
#[derive(Debug, FromRow)]
pub(crate) struct CustomerRow {
    pub id: i64,
    pub name: String,
    pub contact: Option<String>,
    pub token_number: Option<i32>,
    pub or_number: Option<String>,
    pub priority_flags: Json<PriorityFlags>,
    pub manual_position: Option<i32>,
    pub queue_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub served_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = QueueError;

    fn try_from(row: CustomerRow) -> QueueResult<Self> {
        let queue_status = row.queue_status.parse::<QueueStatus>().map_err(|e| {
            QueueError::Persistence(format!("customer {}: {e}", row.id))
        })?;

        Ok(Customer {
            id: row.id,
            name: row.name,
            contact: row.contact,
            token_number: row.token_number,
            or_number: row.or_number,
            priority_flags: row.priority_flags.0,
            manual_position: row.manual_position,
            queue_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            served_at: row.served_at,
            remarks: row.remarks,
        })
    }
}
