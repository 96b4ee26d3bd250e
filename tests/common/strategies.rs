use super::builders::waiting_customer;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use queue_core::models::{Customer, PriorityFlags};

pub fn business_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 1, 0, 0).unwrap()
}

pub fn priority_flags_strategy() -> impl Strategy<Value = PriorityFlags> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(senior_citizen, pregnant, pwd)| {
        PriorityFlags {
            senior_citizen,
            pregnant,
            pwd,
        }
    })
}

/// Customers who all joined within one business day, some manually pinned
pub fn same_day_queue_strategy() -> impl Strategy<Value = Vec<Customer>> {
    prop::collection::vec(
        (
            priority_flags_strategy(),
            0i64..(12 * 3600),
            prop::option::weighted(0.2, 1i32..20),
        ),
        1..25,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(index, (flags, offset_secs, manual))| {
                waiting_customer(
                    index as i64 + 1,
                    flags,
                    business_morning() + Duration::seconds(offset_secs),
                    manual,
                )
            })
            .collect()
    })
}
