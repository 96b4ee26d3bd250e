use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of queue lifecycle event recorded for analytics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventType {
    Joined,
    Called,
    Served,
    Left,
    Cancelled,
    ProcessingStarted,
}

impl QueueEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Called => "called",
            Self::Served => "served",
            Self::Left => "left",
            Self::Cancelled => "cancelled",
            Self::ProcessingStarted => "processing_started",
        }
    }
}

impl fmt::Display for QueueEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joined" => Ok(Self::Joined),
            "called" => Ok(Self::Called),
            "served" => Ok(Self::Served),
            "left" => Ok(Self::Left),
            "cancelled" => Ok(Self::Cancelled),
            "processing_started" => Ok(Self::ProcessingStarted),
            _ => Err(format!("Invalid queue event type: {s}")),
        }
    }
}

/// Append-only analytics event. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueueEvent {
    pub customer_id: i64,
    pub event_type: QueueEventType,
    pub counter_id: Option<i64>,
    pub queue_position: Option<i32>,
    pub wait_time_minutes: Option<i32>,
    pub service_time_minutes: Option<i32>,
    pub processing_duration_minutes: Option<i32>,
    pub is_priority: bool,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewQueueEvent {
    pub fn new(customer_id: i64, event_type: QueueEventType, is_priority: bool) -> Self {
        Self {
            customer_id,
            event_type,
            counter_id: None,
            queue_position: None,
            wait_time_minutes: None,
            service_time_minutes: None,
            processing_duration_minutes: None,
            is_priority,
            reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn at_counter(mut self, counter_id: Option<i64>) -> Self {
        self.counter_id = counter_id;
        self
    }

    pub fn with_queue_position(mut self, position: Option<i32>) -> Self {
        self.queue_position = position;
        self
    }

    pub fn with_wait_time(mut self, minutes: Option<i32>) -> Self {
        self.wait_time_minutes = minutes;
        self
    }

    pub fn with_service_time(mut self, minutes: Option<i32>) -> Self {
        self.service_time_minutes = minutes;
        self
    }

    pub fn with_processing_duration(mut self, minutes: Option<i32>) -> Self {
        self.processing_duration_minutes = minutes;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Persisted `queue_events` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEvent {
    pub id: i64,
    #[serde(flatten)]
    pub event: NewQueueEvent,
}
