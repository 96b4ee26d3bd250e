//! Role capability table for status transitions.
//!
//! Authorization is a lookup keyed by `(role, from, to)`. Entries absent from
//! the table are denied, so unknown roles and read-only roles need no rows.

use super::roles::Role;
use super::states::QueueStatus;
use std::collections::HashMap;

/// Edges of the queue lifecycle. Anything not listed is an invalid transition.
pub const VALID_EDGES: &[(QueueStatus, QueueStatus)] = &[
    (QueueStatus::Waiting, QueueStatus::Serving),
    (QueueStatus::Waiting, QueueStatus::Cancelled),
    (QueueStatus::Serving, QueueStatus::Processing),
    (QueueStatus::Serving, QueueStatus::Completed),
    (QueueStatus::Serving, QueueStatus::Cancelled),
    (QueueStatus::Processing, QueueStatus::Completed),
    (QueueStatus::Processing, QueueStatus::Cancelled),
];

const CASHIER_EDGES: &[(QueueStatus, QueueStatus)] = &[
    (QueueStatus::Waiting, QueueStatus::Serving),
    (QueueStatus::Serving, QueueStatus::Processing),
    (QueueStatus::Serving, QueueStatus::Completed),
    (QueueStatus::Processing, QueueStatus::Completed),
];

pub fn is_valid_edge(from: QueueStatus, to: QueueStatus) -> bool {
    VALID_EDGES.contains(&(from, to))
}

#[derive(Debug, Clone)]
pub struct CapabilityTable {
    grants: HashMap<(Role, QueueStatus, QueueStatus), bool>,
}

impl CapabilityTable {
    /// Empty table that denies everything
    pub fn empty() -> Self {
        Self {
            grants: HashMap::new(),
        }
    }

    /// The standard counter policy:
    /// super admins, admins and the system role may take every valid edge,
    /// cashiers run the normal flow and may cancel from any live status,
    /// sales is read-only.
    pub fn standard() -> Self {
        let mut table = Self::empty();

        for role in [Role::SuperAdmin, Role::Admin, Role::System] {
            for &(from, to) in VALID_EDGES {
                table.grant(role.clone(), from, to);
            }
        }

        for &(from, to) in CASHIER_EDGES {
            table.grant(Role::Cashier, from, to);
        }
        for &(from, to) in VALID_EDGES {
            if to == QueueStatus::Cancelled {
                table.grant(Role::Cashier, from, to);
            }
        }

        table
    }

    pub fn grant(&mut self, role: Role, from: QueueStatus, to: QueueStatus) {
        self.grants.insert((role, from, to), true);
    }

    pub fn revoke(&mut self, role: Role, from: QueueStatus, to: QueueStatus) {
        self.grants.insert((role, from, to), false);
    }

    pub fn permits(&self, role: &Role, from: QueueStatus, to: QueueStatus) -> bool {
        self.grants
            .get(&(role.clone(), from, to))
            .copied()
            .unwrap_or(false)
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::standard()
    }
}
