//! # Priority Ordering Policy
//!
//! Maps a customer to an ordering key; lower keys are served sooner.
//!
//! - A manual position, when set, *is* the key. Manual overrides are absolute
//!   and never combined with priority weight.
//! - Otherwise `key = created_at epoch seconds - weight * 100_000`, where the
//!   weight comes from the first matching flag: senior citizen (1000), PWD
//!   (900), pregnant (800), none (0). Flags are never summed. Heavier weight
//!   means a smaller key, so priority customers are called first.
//! - Equal keys fall back to creation time, then id (FIFO).
//!
//! The Postgres store orders with [`ORDERING_KEY_SQL`], the SQL rendering of
//! the same policy, so listings and `call_next` agree with [`ordering_key`].

use crate::models::{Customer, PriorityFlags};
use std::cmp::Ordering;

pub const WEIGHT_MULTIPLIER: i64 = 100_000;
pub const SENIOR_CITIZEN_WEIGHT: i64 = 1000;
pub const PWD_WEIGHT: i64 = 900;
pub const PREGNANT_WEIGHT: i64 = 800;

/// SQL expression over a `customers` row aliased as `c`
pub const ORDERING_KEY_SQL: &str = r#"
    CASE
        WHEN c.manual_position IS NOT NULL THEN c.manual_position::BIGINT
        ELSE
            (CASE
                WHEN COALESCE((c.priority_flags->>'senior_citizen')::BOOLEAN, FALSE) THEN 1000
                WHEN COALESCE((c.priority_flags->>'pwd')::BOOLEAN, FALSE) THEN 900
                WHEN COALESCE((c.priority_flags->>'pregnant')::BOOLEAN, FALSE) THEN 800
                ELSE 0
            END)::BIGINT * -100000 + FLOOR(EXTRACT(EPOCH FROM c.created_at))::BIGINT
    END
"#;

/// Full ORDER BY clause including FIFO tie-breaks
pub fn order_by_sql() -> String {
    format!("({ORDERING_KEY_SQL}) ASC, c.created_at ASC, c.id ASC")
}

/// Weight of the first matching priority flag
pub fn priority_weight(flags: &PriorityFlags) -> i64 {
    if flags.senior_citizen {
        SENIOR_CITIZEN_WEIGHT
    } else if flags.pwd {
        PWD_WEIGHT
    } else if flags.pregnant {
        PREGNANT_WEIGHT
    } else {
        0
    }
}

pub fn ordering_key(customer: &Customer) -> i64 {
    match customer.manual_position {
        Some(position) => i64::from(position),
        None => {
            customer.created_at.timestamp()
                - priority_weight(&customer.priority_flags) * WEIGHT_MULTIPLIER
        }
    }
}

/// Total order used for listings and candidate selection
pub fn compare(a: &Customer, b: &Customer) -> Ordering {
    ordering_key(a)
        .cmp(&ordering_key(b))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_by_priority(customers: &mut [Customer]) {
    customers.sort_by(compare);
}
