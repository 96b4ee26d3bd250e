use super::roles::Role;
use super::states::QueueStatus;
use thiserror::Error;

/// Rejections produced by the queue state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid status transition: {from} → {to}")]
    InvalidTransition { from: QueueStatus, to: QueueStatus },

    #[error("role not authorized for this transition: {role} cannot move {from} → {to}")]
    Forbidden {
        role: Role,
        from: QueueStatus,
        to: QueueStatus,
    },
}

pub type TransitionResult<T> = Result<T, TransitionError>;
