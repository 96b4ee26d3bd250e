use super::capabilities::{is_valid_edge, CapabilityTable};
use super::errors::{TransitionError, TransitionResult};
use super::roles::Role;
use super::states::QueueStatus;

/// Transition table plus role capability gate for customer queue status
#[derive(Debug, Clone, Default)]
pub struct QueueStateMachine {
    capabilities: CapabilityTable,
}

impl QueueStateMachine {
    pub fn new(capabilities: CapabilityTable) -> Self {
        Self { capabilities }
    }

    /// Check that `from → to` is an edge of the lifecycle
    pub fn validate(&self, from: QueueStatus, to: QueueStatus) -> TransitionResult<()> {
        if is_valid_edge(from, to) {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    /// Validate the edge, then check the role may take it.
    /// Validity is checked first so an impossible edge is always reported as
    /// `InvalidTransition`, whatever the role.
    pub fn authorize(
        &self,
        role: &Role,
        from: QueueStatus,
        to: QueueStatus,
    ) -> TransitionResult<()> {
        self.validate(from, to)?;

        if self.capabilities.permits(role, from, to) {
            Ok(())
        } else {
            tracing::debug!(
                role = %role,
                from = %from,
                to = %to,
                "Transition denied by capability table"
            );
            Err(TransitionError::Forbidden {
                role: role.clone(),
                from,
                to,
            })
        }
    }

    /// Statuses reachable from `from` for the given role
    pub fn allowed_targets(&self, role: &Role, from: QueueStatus) -> Vec<QueueStatus> {
        QueueStatus::ALL
            .into_iter()
            .filter(|&to| self.authorize(role, from, to).is_ok())
            .collect()
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }
}
