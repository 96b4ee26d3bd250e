use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue status of a customer, stored lowercase in `customers.queue_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Registered and waiting to be called
    Waiting,
    /// Called to a counter
    Serving,
    /// Internal processing step after serving (payment, release)
    Processing,
    /// Service finished
    Completed,
    /// Left or removed from the queue
    Cancelled,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 5] = [
        Self::Waiting,
        Self::Serving,
        Self::Processing,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Statuses still occupying the live queue
    pub const ACTIVE: [QueueStatus; 3] = [Self::Waiting, Self::Serving, Self::Processing];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Check if a counter is attending the customer
    pub fn is_attended(&self) -> bool {
        matches!(self, Self::Serving | Self::Processing)
    }

    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Serving => "serving",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Serving => write!(f, "SERVING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(Self::Waiting),
            "serving" => Ok(Self::Serving),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid queue status: {s}")),
        }
    }
}

/// New customers enter the queue waiting
impl Default for QueueStatus {
    fn default() -> Self {
        Self::Waiting
    }
}
