//! Typed realtime payloads. The transport layer decides how they go on the wire;
//! the channel name travels with each message.

use crate::models::CustomerSnapshot;
use crate::queue::archival::ResetSummary;
use crate::state_machine::QueueStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const QUEUE_UPDATE_CHANNEL: &str = "queue:update";
pub const STATUS_CHANGED_CHANNEL: &str = "queue:status_changed";
pub const QUEUE_RESET_CHANNEL: &str = "queue_reset";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueUpdateKind {
    CustomerJoined,
    CustomerCalled,
    CustomerCompleted,
    CustomerCancelled,
    QueueReordered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueUpdate {
    #[serde(rename = "type")]
    pub kind: QueueUpdateKind,
    pub customer: Option<CustomerSnapshot>,
    pub counter_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub processing_count: i64,
    pub suppress_sound: bool,
    /// New manual order, only on `queue_reordered`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<i64>>,
}

impl QueueUpdate {
    pub fn new(
        kind: QueueUpdateKind,
        customer: Option<CustomerSnapshot>,
        processing_count: i64,
    ) -> Self {
        Self {
            kind,
            customer,
            counter_id: None,
            timestamp: Utc::now(),
            processing_count,
            suppress_sound: false,
            order: None,
        }
    }

    pub fn at_counter(mut self, counter_id: Option<i64>) -> Self {
        self.counter_id = counter_id;
        self
    }

    pub fn with_order(mut self, order: Vec<i64>) -> Self {
        self.order = Some(order);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub customer_id: i64,
    pub previous_status: QueueStatus,
    pub new_status: QueueStatus,
    /// Displays stay quiet when a customer moves into back-office processing
    pub suppress_sound: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueResetNotice {
    pub admin_id: String,
    pub reason: String,
    pub result: ResetSummary,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum RealtimeMessage {
    #[serde(rename = "queue:update")]
    QueueUpdate(QueueUpdate),
    #[serde(rename = "queue:status_changed")]
    StatusChanged(StatusChanged),
    #[serde(rename = "queue_reset")]
    QueueReset(QueueResetNotice),
}

impl RealtimeMessage {
    pub fn channel(&self) -> &'static str {
        match self {
            Self::QueueUpdate(_) => QUEUE_UPDATE_CHANNEL,
            Self::StatusChanged(_) => STATUS_CHANGED_CHANNEL,
            Self::QueueReset(_) => QUEUE_RESET_CHANNEL,
        }
    }

    pub fn suppress_sound(&self) -> bool {
        match self {
            Self::QueueUpdate(update) => update.suppress_sound,
            Self::StatusChanged(change) => change.suppress_sound,
            Self::QueueReset(_) => false,
        }
    }
}
