use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller role as resolved by the outer authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Cashier,
    /// Read-only access to the queue
    Sales,
    /// Scheduler-driven maintenance (daily reset)
    System,
    /// A role string the engine does not know; holds no capabilities
    Unrecognized(String),
}

impl Role {
    /// Parse an authenticated role string. Never fails: unknown roles map to
    /// `Unrecognized` and are denied by the capability table.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "super_admin" | "superadmin" => Self::SuperAdmin,
            "admin" => Self::Admin,
            "cashier" => Self::Cashier,
            "sales" => Self::Sales,
            "system" => Self::System,
            _ => Self::Unrecognized(raw.to_string()),
        }
    }

    pub fn is_administrative(&self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin | Self::System)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SuperAdmin => write!(f, "super_admin"),
            Self::Admin => write!(f, "admin"),
            Self::Cashier => write!(f, "cashier"),
            Self::Sales => write!(f, "sales"),
            Self::System => write!(f, "system"),
            Self::Unrecognized(raw) => write!(f, "{raw}"),
        }
    }
}

impl From<&str> for Role {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
