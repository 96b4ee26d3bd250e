//! Error types for the queue engine.

use crate::state_machine::errors::TransitionError;
use crate::state_machine::{QueueStatus, Role};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid status transition: {from} → {to}")]
    InvalidTransition { from: QueueStatus, to: QueueStatus },

    #[error("role not authorized for this transition: {role} cannot move {from} → {to}")]
    Forbidden {
        role: String,
        from: QueueStatus,
        to: QueueStatus,
    },

    #[error("role not authorized for this operation: {role} cannot {operation}")]
    OperationForbidden { role: String, operation: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Side channel failure: {0}")]
    SideChannel(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Daily reset already in progress")]
    ResetInProgress,
}

impl QueueError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn operation_forbidden(role: &Role, operation: impl Into<String>) -> Self {
        Self::OperationForbidden {
            role: role.to_string(),
            operation: operation.into(),
        }
    }

    /// True for the "nothing to act on" outcome that targeted calls surface as `None`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

impl From<TransitionError> for QueueError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition { from, to } => {
                QueueError::InvalidTransition { from, to }
            }
            TransitionError::Forbidden { role, from, to } => QueueError::Forbidden {
                role: role.to_string(),
                from,
                to,
            },
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Persistence(format!("JSON serialization error: {err}"))
    }
}

impl From<sqlx::migrate::MigrateError> for QueueError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        QueueError::Persistence(format!("Migration failed: {err}"))
    }
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
