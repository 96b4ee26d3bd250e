mod common;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc, Weekday};
use common::*;
use queue_core::database::MemoryQueueStore;
use queue_core::error::{QueueError, QueueResult};
use queue_core::models::{NewQueueEvent, PriorityFlags, QueueEventType, ResetLogEntry};
use queue_core::queue::ResetSummary;
use queue_core::scheduler::{DailyResetScheduler, ResetPipeline, ResetRunOutcome, SchedulerConfig};
use queue_core::state_machine::QueueStatus;
use queue_core::QueueStore;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Pipeline that fails a fixed number of times and can be slowed down
#[derive(Debug, Default)]
struct ScriptedPipeline {
    failures_left: AtomicU32,
    calls: AtomicU32,
    delay: Duration,
}

impl ScriptedPipeline {
    fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResetPipeline for ScriptedPipeline {
    async fn run_reset(&self) -> QueueResult<ResetSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            Err(QueueError::Persistence("database unavailable".to_string()))
        } else {
            Ok(ResetSummary::default())
        }
    }
}

fn fast_retry() -> SchedulerConfig {
    SchedulerConfig {
        retry_delay: Duration::from_millis(50),
        ..SchedulerConfig::default()
    }
}

fn scheduler_with(
    pipeline: Arc<ScriptedPipeline>,
    store: Arc<MemoryQueueStore>,
    config: SchedulerConfig,
) -> DailyResetScheduler {
    DailyResetScheduler::new(pipeline, store, test_calendar(), config)
}

async fn wait_for_attempts(store: &MemoryQueueStore, expected: usize) -> Vec<ResetLogEntry> {
    let today = test_calendar().today().date;
    for _ in 0..100 {
        let attempts = store.list_reset_attempts(today).await.unwrap();
        if attempts.len() >= expected {
            return attempts;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {expected} reset attempts to be logged");
}

#[tokio::test]
async fn test_scheduled_run_resets_queue_and_logs_success() {
    let harness = QueueHarness::new();
    let counter = harness.counter("Counter 1").await;
    let waiting = join(&harness.ops, "waiting", PriorityFlags::none(), 0).await;
    let serving = join(&harness.ops, "serving", PriorityFlags::senior(), 0).await;
    harness
        .ops
        .call_next(counter.id, &queue_core::Role::Cashier)
        .await
        .unwrap();

    let scheduler = DailyResetScheduler::new(
        Arc::new(harness.coordinator()),
        harness.store.clone(),
        harness.calendar.clone(),
        SchedulerConfig::default(),
    );

    let outcome = scheduler.run_scheduled().await;
    assert_eq!(
        outcome,
        ResetRunOutcome::Completed {
            summary: ResetSummary {
                cancelled_count: 1,
                completed_count: 1,
                archived_count: 2,
                archive_failures: 0,
            }
        }
    );

    let waiting = harness.store.find_customer(waiting.id).await.unwrap().unwrap();
    let serving = harness.store.find_customer(serving.id).await.unwrap().unwrap();
    assert_eq!(waiting.queue_status, QueueStatus::Cancelled);
    assert_eq!(serving.queue_status, QueueStatus::Completed);

    let attempts = harness
        .store
        .list_reset_attempts(harness.calendar.today().date)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].success);
    assert!(scheduler.status().last_reset.is_some());
}

#[tokio::test]
async fn test_second_run_on_the_same_day_is_skipped() {
    let store = Arc::new(MemoryQueueStore::new());
    let pipeline = Arc::new(ScriptedPipeline::default());
    let scheduler = scheduler_with(pipeline.clone(), store.clone(), SchedulerConfig::default());

    assert!(matches!(
        scheduler.run_scheduled().await,
        ResetRunOutcome::Completed { .. }
    ));
    assert_eq!(scheduler.run_scheduled().await, ResetRunOutcome::AlreadyDoneToday);
    let manual = tokio_test::assert_ok!(scheduler.trigger_manual().await);
    assert_eq!(manual, ResetRunOutcome::AlreadyDoneToday);

    assert_eq!(pipeline.calls(), 1);
    let attempts = wait_for_attempts(&store, 1).await;
    assert_eq!(attempts.len(), 1);
}

#[tokio::test]
async fn test_overlapping_triggers_are_single_flight() {
    let store = Arc::new(MemoryQueueStore::new());
    let pipeline = Arc::new(ScriptedPipeline::slow(Duration::from_millis(300)));
    let scheduler = scheduler_with(pipeline.clone(), store.clone(), SchedulerConfig::default());

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_scheduled().await })
    };

    for _ in 0..100 {
        if scheduler.status().is_running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(scheduler.status().is_running);

    assert_eq!(scheduler.run_scheduled().await, ResetRunOutcome::AlreadyRunning);
    assert!(matches!(
        scheduler.trigger_manual().await,
        Err(QueueError::ResetInProgress)
    ));

    let outcome = first.await.unwrap();
    assert!(matches!(outcome, ResetRunOutcome::Completed { .. }));
    assert_eq!(pipeline.calls(), 1);
    assert!(!scheduler.status().is_running);
}

#[tokio::test]
async fn test_failed_run_is_retried_once() {
    let store = Arc::new(MemoryQueueStore::new());
    let pipeline = Arc::new(ScriptedPipeline::failing(1));
    let scheduler = scheduler_with(pipeline.clone(), store.clone(), fast_retry());

    let outcome = scheduler.run_scheduled().await;
    assert_eq!(
        outcome,
        ResetRunOutcome::Failed {
            error: "Persistence failure: database unavailable".to_string(),
            retry_scheduled: true,
        }
    );

    let attempts = wait_for_attempts(&store, 2).await;
    assert!(!attempts[0].success);
    assert_eq!(
        attempts[0].error.as_deref(),
        Some("Persistence failure: database unavailable")
    );
    assert!(attempts[1].success);
    assert_eq!(pipeline.calls(), 2);
}

#[tokio::test]
async fn test_failed_retry_is_not_retried_again() {
    let store = Arc::new(MemoryQueueStore::new());
    let pipeline = Arc::new(ScriptedPipeline::failing(10));
    let scheduler = scheduler_with(pipeline.clone(), store.clone(), fast_retry());

    scheduler.run_scheduled().await;
    let attempts = wait_for_attempts(&store, 2).await;
    assert!(attempts.iter().all(|a| !a.success));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(pipeline.calls(), 2);
    let today = test_calendar().today().date;
    assert_eq!(store.list_reset_attempts(today).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_stop_cancels_pending_retry() {
    let store = Arc::new(MemoryQueueStore::new());
    let pipeline = Arc::new(ScriptedPipeline::failing(1));
    let config = SchedulerConfig {
        retry_delay: Duration::from_millis(200),
        ..SchedulerConfig::default()
    };
    let scheduler = scheduler_with(pipeline.clone(), store.clone(), config);

    scheduler.start().unwrap();
    scheduler.run_scheduled().await;
    scheduler.stop().await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(pipeline.calls(), 1);
}

#[tokio::test]
async fn test_start_is_not_reentrant() {
    let store = Arc::new(MemoryQueueStore::new());
    let scheduler = scheduler_with(
        Arc::new(ScriptedPipeline::default()),
        store,
        SchedulerConfig::default(),
    );

    scheduler.start().unwrap();
    assert!(scheduler.status().is_scheduled);
    assert!(matches!(scheduler.start(), Err(QueueError::Scheduler(_))));

    scheduler.stop().await;
    let status = scheduler.status();
    assert!(!status.is_scheduled);
    assert_eq!(status.timezone, "Asia/Manila");

    scheduler.start().unwrap();
    scheduler.stop().await;
}

#[tokio::test]
async fn test_next_reset_is_local_midnight() {
    let scheduler = scheduler_with(
        Arc::new(ScriptedPipeline::default()),
        Arc::new(MemoryQueueStore::new()),
        SchedulerConfig::default(),
    );

    // Local midnight at +08:00 is 16:00 UTC
    let morning = Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap();
    assert_eq!(
        scheduler.next_reset_time(morning),
        Utc.with_ymd_and_hms(2024, 5, 2, 16, 0, 0).unwrap()
    );

    let exactly = Utc.with_ymd_and_hms(2024, 5, 2, 16, 0, 0).unwrap();
    assert_eq!(
        scheduler.next_reset_time(exactly),
        Utc.with_ymd_and_hms(2024, 5, 3, 16, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_cleanup_purges_rows_past_retention() {
    let store = Arc::new(MemoryQueueStore::new());
    let scheduler = scheduler_with(
        Arc::new(ScriptedPipeline::default()),
        store.clone(),
        SchedulerConfig {
            cleanup_weekday: Weekday::Sun,
            retention_days: 30,
            ..SchedulerConfig::default()
        },
    );
    let today = test_calendar().today().date;

    store
        .record_reset_attempt(&ResetLogEntry::success(today - ChronoDuration::days(90), 12))
        .await
        .unwrap();
    store
        .record_reset_attempt(&ResetLogEntry::success(today - ChronoDuration::days(3), 12))
        .await
        .unwrap();

    let mut old_event = NewQueueEvent::new(1, QueueEventType::Joined, false);
    old_event.created_at = Utc::now() - ChronoDuration::days(120);
    store.insert_queue_event(&old_event).await.unwrap();
    store
        .insert_queue_event(&NewQueueEvent::new(2, QueueEventType::Joined, false))
        .await
        .unwrap();

    let counts = scheduler.run_cleanup().await.unwrap();
    assert_eq!(counts.reset_logs, 1);
    assert_eq!(counts.events, 1);
    assert_eq!(counts.history, 0);
    assert_eq!(counts.total(), 2);

    assert_eq!(store.list_queue_events(None).await.unwrap().len(), 1);
}
