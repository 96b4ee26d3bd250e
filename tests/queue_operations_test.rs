mod common;

use common::*;
use futures::future::join_all;
use queue_core::error::QueueError;
use queue_core::events::{QueueUpdateKind, RealtimeMessage, QUEUE_UPDATE_CHANNEL};
use queue_core::models::{PriorityFlags, QueueEventType};
use queue_core::state_machine::{QueueStatus, Role};
use queue_core::QueueStore;
use std::collections::HashSet;

#[tokio::test]
async fn test_call_next_serves_priority_classes_before_arrival_order() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let cashier = Role::Cashier;

    let regular = join(&harness.ops, "regular", PriorityFlags::none(), 40).await;
    let pregnant = join(&harness.ops, "pregnant", PriorityFlags::pregnant(), 30).await;
    let pwd = join(&harness.ops, "pwd", PriorityFlags::pwd(), 20).await;
    let senior = join(&harness.ops, "senior", PriorityFlags::senior(), 10).await;

    let mut called = Vec::new();
    while let Some(customer) = harness.ops.call_next(counter.id, &cashier).await.unwrap() {
        called.push(customer.id);
        harness
            .ops
            .complete_service(customer.id, counter.id, &cashier)
            .await
            .unwrap();
    }

    assert_eq!(called, vec![senior.id, pwd.id, pregnant.id, regular.id]);
}

#[tokio::test]
async fn test_call_next_breaks_ties_by_arrival() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;

    let first = join(&harness.ops, "first", PriorityFlags::none(), 20).await;
    let _second = join(&harness.ops, "second", PriorityFlags::none(), 10).await;

    let called = harness
        .ops
        .call_next(counter.id, &Role::Cashier)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(called.id, first.id);
    assert_eq!(called.queue_status, QueueStatus::Serving);
}

#[tokio::test]
async fn test_call_next_on_empty_queue_returns_none() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;

    let result = harness.ops.call_next(counter.id, &Role::Cashier).await.unwrap();
    assert!(result.is_none());

    let counter = harness.store.find_counter(counter.id).await.unwrap().unwrap();
    assert_eq!(counter.current_customer_id, None);
}

#[tokio::test]
async fn test_call_next_on_inactive_or_unknown_counter_returns_none() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let waiting = join(&harness.ops, "a", PriorityFlags::none(), 5).await;

    harness
        .ops
        .set_counter_active(counter.id, false, &Role::Admin)
        .await
        .unwrap();

    assert!(harness.ops.call_next(counter.id, &Role::Cashier).await.unwrap().is_none());
    assert!(harness.ops.call_next(9999, &Role::Cashier).await.unwrap().is_none());

    let unchanged = harness.store.find_customer(waiting.id).await.unwrap().unwrap();
    assert_eq!(unchanged.queue_status, QueueStatus::Waiting);
}

#[tokio::test]
async fn test_call_next_is_forbidden_for_read_only_roles() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let waiting = join(&harness.ops, "a", PriorityFlags::none(), 5).await;

    let err = harness
        .ops
        .call_next(counter.id, &Role::Sales)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Forbidden { ref role, .. } if role == "sales"));

    let err = harness
        .ops
        .call_next(counter.id, &Role::parse("auditor"))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Forbidden { .. }));

    let unchanged = harness.store.find_customer(waiting.id).await.unwrap().unwrap();
    assert_eq!(unchanged.queue_status, QueueStatus::Waiting);
}

#[tokio::test]
async fn test_concurrent_call_next_never_double_assigns() {
    let harness = QueueHarness::new();
    let cashier = Role::Cashier;

    let mut counters = Vec::new();
    for index in 1..=6 {
        counters.push(harness.counter(&format!("Counter {index}")).await);
    }
    for index in 0..4 {
        join(&harness.ops, &format!("customer {index}"), PriorityFlags::none(), 10 - index).await;
    }

    let results = join_all(
        counters
            .iter()
            .map(|counter| harness.ops.call_next(counter.id, &cashier)),
    )
    .await;

    let called: Vec<i64> = results
        .into_iter()
        .map(|r| r.unwrap())
        .flatten()
        .map(|c| c.id)
        .collect();
    assert_eq!(called.len(), 4);
    let distinct: HashSet<i64> = called.iter().copied().collect();
    assert_eq!(distinct.len(), 4, "a customer was called to two counters");

    let bound: Vec<i64> = harness
        .ops
        .list_counters()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|c| c.current_customer_id)
        .collect();
    assert_eq!(bound.len(), 4);
    assert_eq!(bound.iter().copied().collect::<HashSet<_>>(), distinct);
}

#[tokio::test]
async fn test_call_next_records_position_and_wait() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let customer = join(&harness.ops, "a", PriorityFlags::senior(), 30).await;

    harness.ops.call_next(counter.id, &Role::Cashier).await.unwrap();
    harness.settle().await;

    let events = harness.store.list_queue_events(Some(customer.id)).await.unwrap();
    let kinds: Vec<QueueEventType> = events.iter().map(|e| e.event.event_type).collect();
    assert_eq!(kinds, vec![QueueEventType::Joined, QueueEventType::Called]);

    let called = &events[1].event;
    assert_eq!(called.counter_id, Some(counter.id));
    assert_eq!(called.queue_position, Some(1));
    assert!(called.is_priority);
    assert!(called.wait_time_minutes.unwrap() >= 29);

    let updates = harness.realtime.on_channel(QUEUE_UPDATE_CHANNEL);
    let last = updates.last().unwrap();
    match last {
        RealtimeMessage::QueueUpdate(update) => {
            assert_eq!(update.kind, QueueUpdateKind::CustomerCalled);
            assert_eq!(update.counter_id, Some(counter.id));
            assert!(!update.suppress_sound);
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[tokio::test]
async fn test_call_specific_only_takes_waiting_customers() {
    let harness = QueueHarness::new();
    let first = harness.counter("Counter 1").await;
    let second = harness.counter("Counter 2").await;
    let _ahead = join(&harness.ops, "ahead", PriorityFlags::senior(), 30).await;
    let target = join(&harness.ops, "target", PriorityFlags::none(), 5).await;

    let called = harness
        .ops
        .call_specific(target.id, first.id, &Role::Cashier)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(called.id, target.id);
    assert_eq!(called.queue_status, QueueStatus::Serving);

    // Already serving: nothing to act on
    let again = harness
        .ops
        .call_specific(target.id, second.id, &Role::Cashier)
        .await
        .unwrap();
    assert!(again.is_none());

    let missing = harness
        .ops
        .call_specific(424242, second.id, &Role::Cashier)
        .await
        .unwrap();
    assert!(missing.is_none());

    let first = harness.store.find_counter(first.id).await.unwrap().unwrap();
    let second = harness.store.find_counter(second.id).await.unwrap().unwrap();
    assert_eq!(first.current_customer_id, Some(target.id));
    assert_eq!(second.current_customer_id, None);
}

#[tokio::test]
async fn test_complete_service_frees_counter_and_stamps_served_at() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let customer = join(&harness.ops, "a", PriorityFlags::none(), 15).await;
    let cashier = Role::Cashier;

    harness.ops.call_next(counter.id, &cashier).await.unwrap();
    let completed = harness
        .ops
        .complete_service(customer.id, counter.id, &cashier)
        .await
        .unwrap();

    assert_eq!(completed.queue_status, QueueStatus::Completed);
    assert!(completed.served_at.is_some());

    let counter = harness.store.find_counter(counter.id).await.unwrap().unwrap();
    assert_eq!(counter.current_customer_id, None);

    harness.settle().await;
    let events = harness.store.list_queue_events(Some(customer.id)).await.unwrap();
    let served = events
        .iter()
        .find(|e| e.event.event_type == QueueEventType::Served)
        .expect("served event recorded");
    assert_eq!(served.event.counter_id, Some(counter.id));
    assert!(served.event.service_time_minutes.is_some());
    assert_eq!(served.event.processing_duration_minutes, None);
}

#[tokio::test]
async fn test_complete_service_reports_the_counter_actually_freed() {
    let harness = QueueHarness::new();
    let serving = harness.counter("Counter 1").await;
    let other = harness.counter("Counter 2").await;
    let customer = join(&harness.ops, "a", PriorityFlags::none(), 15).await;
    let cashier = Role::Cashier;

    harness.ops.call_next(serving.id, &cashier).await.unwrap();
    harness
        .ops
        .complete_service(customer.id, other.id, &cashier)
        .await
        .unwrap();
    harness.settle().await;

    let serving = harness.store.find_counter(serving.id).await.unwrap().unwrap();
    assert_eq!(serving.current_customer_id, None);

    let events = harness.store.list_queue_events(Some(customer.id)).await.unwrap();
    let served = events
        .iter()
        .find(|e| e.event.event_type == QueueEventType::Served)
        .expect("served event recorded");
    assert_eq!(served.event.counter_id, Some(serving.id));

    match harness.realtime.on_channel(QUEUE_UPDATE_CHANNEL).last() {
        Some(RealtimeMessage::QueueUpdate(update)) => {
            assert_eq!(update.kind, QueueUpdateKind::CustomerCompleted);
            assert_eq!(update.counter_id, Some(serving.id));
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[tokio::test]
async fn test_complete_service_requires_an_attended_customer() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let customer = join(&harness.ops, "a", PriorityFlags::none(), 15).await;

    let err = harness
        .ops
        .complete_service(customer.id, counter.id, &Role::Cashier)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidTransition {
            from: QueueStatus::Waiting,
            to: QueueStatus::Completed
        }
    ));

    let unchanged = harness.store.find_customer(customer.id).await.unwrap().unwrap();
    assert_eq!(unchanged.queue_status, QueueStatus::Waiting);
    assert_eq!(unchanged.served_at, None);
}

#[tokio::test]
async fn test_cancel_service_archives_with_reason() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let customer = join(&harness.ops, "a", PriorityFlags::pwd(), 10).await;

    harness.ops.call_next(counter.id, &Role::Cashier).await.unwrap();
    let cancelled = harness
        .ops
        .cancel_service(customer.id, Some("left the branch"), &Role::Cashier)
        .await
        .unwrap();

    assert_eq!(cancelled.queue_status, QueueStatus::Cancelled);
    assert!(cancelled.served_at.is_some());
    assert!(cancelled
        .remarks
        .as_deref()
        .unwrap()
        .contains("Cancelled: left the branch"));

    let counter = harness.store.find_counter(counter.id).await.unwrap().unwrap();
    assert_eq!(counter.current_customer_id, None);

    let history = harness
        .store
        .list_history(harness.calendar.today().date)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].original_customer_id, customer.id);
    assert_eq!(history[0].queue_status, QueueStatus::Cancelled);

    harness.settle().await;
    let events = harness.store.list_queue_events(Some(customer.id)).await.unwrap();
    let event = events
        .iter()
        .find(|e| e.event.event_type == QueueEventType::Cancelled)
        .unwrap();
    assert_eq!(event.event.reason.as_deref(), Some("left the branch"));
}

#[tokio::test]
async fn test_cancel_without_reason_and_after_completion() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let cashier = Role::Cashier;
    let waiting = join(&harness.ops, "waiting", PriorityFlags::none(), 10).await;
    let done = join(&harness.ops, "done", PriorityFlags::senior(), 5).await;

    harness.ops.call_next(counter.id, &cashier).await.unwrap();
    harness.ops.complete_service(done.id, counter.id, &cashier).await.unwrap();

    let cancelled = harness
        .ops
        .cancel_service(waiting.id, Some("   "), &cashier)
        .await
        .unwrap();
    assert!(cancelled
        .remarks
        .as_deref()
        .unwrap()
        .contains("Cancelled: No reason provided"));

    let err = harness
        .ops
        .cancel_service(done.id, None, &cashier)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidTransition {
            from: QueueStatus::Completed,
            to: QueueStatus::Cancelled
        }
    ));

    let err = harness
        .ops
        .cancel_service(waiting.id, Some("again"), &Role::Admin)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidTransition {
            from: QueueStatus::Cancelled,
            to: QueueStatus::Cancelled
        }
    ));
}

#[tokio::test]
async fn test_processing_change_suppresses_sound() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let customer = join(&harness.ops, "a", PriorityFlags::none(), 10).await;
    let cashier = Role::Cashier;

    harness.ops.call_next(counter.id, &cashier).await.unwrap();
    let processing = harness
        .ops
        .change_status(customer.id, QueueStatus::Processing, &cashier)
        .await
        .unwrap();
    assert_eq!(processing.queue_status, QueueStatus::Processing);

    // Counter stays bound while the customer is in the back office
    let bound = harness.store.find_counter(counter.id).await.unwrap().unwrap();
    assert_eq!(bound.current_customer_id, Some(customer.id));

    let completed = harness
        .ops
        .change_status(customer.id, QueueStatus::Completed, &cashier)
        .await
        .unwrap();
    assert!(completed.served_at.is_some());
    let freed = harness.store.find_counter(counter.id).await.unwrap().unwrap();
    assert_eq!(freed.current_customer_id, None);

    harness.settle().await;
    let changes: Vec<(QueueStatus, QueueStatus, bool)> = harness
        .realtime
        .messages()
        .into_iter()
        .filter_map(|m| match m {
            RealtimeMessage::StatusChanged(change) => Some((
                change.previous_status,
                change.new_status,
                change.suppress_sound,
            )),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            (QueueStatus::Serving, QueueStatus::Processing, true),
            (QueueStatus::Processing, QueueStatus::Completed, false),
        ]
    );

    let events = harness.store.list_queue_events(Some(customer.id)).await.unwrap();
    let served = events
        .iter()
        .find(|e| e.event.event_type == QueueEventType::Served)
        .unwrap();
    assert!(served.event.processing_duration_minutes.is_some());
    assert!(events
        .iter()
        .any(|e| e.event.event_type == QueueEventType::ProcessingStarted));
}

#[tokio::test]
async fn test_change_status_rejects_invalid_edges_for_every_role() {
    let harness = QueueHarness::new();
    let customer = join(&harness.ops, "a", PriorityFlags::none(), 10).await;

    for role in [Role::SuperAdmin, Role::Cashier, Role::Sales] {
        let err = harness
            .ops
            .change_status(customer.id, QueueStatus::Processing, &role)
            .await
            .unwrap_err();
        assert!(
            matches!(err, QueueError::InvalidTransition { .. }),
            "{role} got {err:?}"
        );
    }

    let err = harness
        .ops
        .change_status(customer.id, QueueStatus::Serving, &Role::Sales)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Forbidden { .. }));

    let unchanged = harness.store.find_customer(customer.id).await.unwrap().unwrap();
    assert_eq!(unchanged, customer);
}

#[tokio::test]
async fn test_change_status_to_cancelled_uses_cancel_semantics() {
    let harness = QueueHarness::new();
    let customer = join(&harness.ops, "a", PriorityFlags::none(), 10).await;

    let cancelled = harness
        .ops
        .change_status(customer.id, QueueStatus::Cancelled, &Role::Admin)
        .await
        .unwrap();
    assert!(cancelled.served_at.is_some());
    assert!(cancelled
        .remarks
        .as_deref()
        .unwrap()
        .contains("No reason provided"));

    let history = harness
        .store
        .list_history(harness.calendar.today().date)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_reorder_pins_positions_for_admins_only() {
    let harness = QueueHarness::new();
    let first = join(&harness.ops, "first", PriorityFlags::senior(), 30).await;
    let second = join(&harness.ops, "second", PriorityFlags::none(), 20).await;
    let third = join(&harness.ops, "third", PriorityFlags::none(), 10).await;

    let err = harness
        .ops
        .reorder(&[third.id, second.id], &Role::Cashier)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::OperationForbidden { .. }));

    let listing = harness
        .ops
        .reorder(&[third.id, second.id], &Role::Admin)
        .await
        .unwrap();
    let order: Vec<i64> = listing.iter().map(|e| e.customer.id).collect();
    assert_eq!(order, vec![third.id, second.id, first.id]);
    assert_eq!(listing[0].customer.manual_position, Some(1));
    assert_eq!(listing[1].customer.manual_position, Some(2));
    assert_eq!(listing[2].position, 3);

    harness.settle().await;
    let reordered = harness.realtime.messages().into_iter().any(|m| {
        matches!(
            m,
            RealtimeMessage::QueueUpdate(update)
                if update.kind == QueueUpdateKind::QueueReordered
                    && update.order == Some(vec![third.id, second.id])
        )
    });
    assert!(reordered);
}

#[tokio::test]
async fn test_reorder_skips_customers_no_longer_waiting() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let serving = join(&harness.ops, "serving", PriorityFlags::senior(), 30).await;
    let waiting = join(&harness.ops, "waiting", PriorityFlags::none(), 10).await;

    harness.ops.call_next(counter.id, &Role::Cashier).await.unwrap();
    harness
        .ops
        .reorder(&[serving.id, waiting.id], &Role::Admin)
        .await
        .unwrap();

    let serving = harness.store.find_customer(serving.id).await.unwrap().unwrap();
    let waiting = harness.store.find_customer(waiting.id).await.unwrap().unwrap();
    assert_eq!(serving.manual_position, None);
    assert_eq!(waiting.manual_position, Some(2));
}

#[tokio::test]
async fn test_display_queue_lists_serving_then_waiting() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let serving = join(&harness.ops, "serving", PriorityFlags::senior(), 40).await;
    let next = join(&harness.ops, "next", PriorityFlags::none(), 30).await;
    let last = join(&harness.ops, "last", PriorityFlags::none(), 20).await;

    harness.ops.call_next(counter.id, &Role::Cashier).await.unwrap();

    let display = harness.ops.display_queue().await.unwrap();
    let rows: Vec<(i64, i32, i64)> = display
        .iter()
        .map(|e| (e.customer.id, e.position, e.estimated_wait_minutes))
        .collect();
    assert_eq!(
        rows,
        vec![(serving.id, 0, 0), (next.id, 1, 0), (last.id, 2, 15)]
    );

    assert_eq!(harness.ops.position_of(last.id).await.unwrap(), Some(2));
    assert_eq!(harness.ops.position_of(serving.id).await.unwrap(), None);
    assert_eq!(harness.ops.estimated_wait_minutes(last.id).await.unwrap(), 15);
}

#[tokio::test]
async fn test_statistics_over_waiting_customers() {
    let harness = QueueHarness::new();
    join(&harness.ops, "a", PriorityFlags::senior(), 30).await;
    join(&harness.ops, "b", PriorityFlags::none(), 10).await;

    let stats = harness.ops.statistics().await.unwrap();
    assert_eq!(stats.total_waiting, 2);
    assert_eq!(stats.priority_customers, 1);
    assert!(stats.longest_wait_minutes >= 30.0);
    assert!(stats.average_wait_minutes >= 20.0);
    assert!(stats.average_wait_minutes < stats.longest_wait_minutes);
}

#[tokio::test]
async fn test_side_channel_failure_does_not_fail_the_operation() {
    let harness = QueueHarness::new();
    harness.store.fail_next_event_inserts(1);

    let customer = join(&harness.ops, "a", PriorityFlags::none(), 5).await;
    harness.settle().await;

    assert_eq!(customer.queue_status, QueueStatus::Waiting);
    assert!(harness.dispatcher.stats().failed >= 1);
    assert!(harness
        .store
        .list_queue_events(Some(customer.id))
        .await
        .unwrap()
        .is_empty());
    // The realtime notification still went out
    assert_eq!(harness.realtime.on_channel(QUEUE_UPDATE_CHANNEL).len(), 1);
}

#[tokio::test]
async fn test_counter_management_requires_admin() {
    let harness = QueueHarness::new();

    let err = harness
        .ops
        .create_counter("Counter 9", &Role::Cashier)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::OperationForbidden { .. }));

    let counter = harness.counter("Counter 9").await;
    let err = harness
        .ops
        .set_counter_active(counter.id, false, &Role::Sales)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::OperationForbidden { .. }));
}
