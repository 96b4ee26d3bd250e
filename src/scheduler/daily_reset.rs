//! # Daily Reset Scheduler
//!
//! Runs the archival pipeline at local midnight of the business calendar and
//! purges old analytics rows once a week.
//!
//! ## Run semantics
//!
//! - **Single-flight**: a trigger that arrives while a run is in progress is
//!   logged and skipped. A manual trigger in that window is rejected with
//!   [`QueueError::ResetInProgress`].
//! - **Once per day**: before running, the reset log is consulted; a
//!   successful entry for today's business date skips the run. This is what
//!   keeps a restart shortly after midnight from resetting twice.
//! - **One retry**: a failed run is logged and retried once after a fixed
//!   delay. A failed retry is logged as critical and left for an operator.
//!
//! Every attempt that reaches the pipeline writes one `daily_reset_log` row.

use crate::calendar::BusinessCalendar;
use crate::database::{PurgeCounts, QueueStore};
use crate::error::{QueueError, QueueResult};
use crate::logging::log_error;
use crate::models::ResetLogEntry;
use crate::queue::ResetSummary;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc, Weekday};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// The work the scheduler triggers
#[async_trait]
pub trait ResetPipeline: Send + Sync {
    async fn run_reset(&self) -> QueueResult<ResetSummary>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub reset_hour: u32,
    pub reset_minute: u32,
    pub retry_delay: Duration,
    pub cleanup_weekday: Weekday,
    pub cleanup_hour: u32,
    pub retention_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reset_hour: 0,
            reset_minute: 0,
            retry_delay: Duration::from_secs(300),
            cleanup_weekday: Weekday::Sun,
            cleanup_hour: 2,
            retention_days: 365,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Scheduled,
    Manual,
    Retry,
}

impl Attempt {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Retry => "retry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResetRunOutcome {
    Completed { summary: ResetSummary },
    AlreadyDoneToday,
    AlreadyRunning,
    Failed { error: String, retry_scheduled: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub is_scheduled: bool,
    pub next_reset_time: DateTime<Utc>,
    pub last_reset: Option<DateTime<Utc>>,
    pub timezone: String,
}

#[derive(Debug, Default)]
struct SchedulerState {
    last_reset: Option<DateTime<Utc>>,
    timers: Vec<JoinHandle<()>>,
}

/// Clears the in-flight flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct SchedulerInner {
    pipeline: Arc<dyn ResetPipeline>,
    store: Arc<dyn QueueStore>,
    calendar: BusinessCalendar,
    config: SchedulerConfig,
    running: AtomicBool,
    state: Mutex<SchedulerState>,
    shutdown: watch::Sender<bool>,
}

/// Owned scheduler instance; clones share the same state
#[derive(Clone)]
pub struct DailyResetScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for DailyResetScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyResetScheduler")
            .field("calendar", &self.inner.calendar)
            .field("config", &self.inner.config)
            .field("running", &self.inner.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl DailyResetScheduler {
    pub fn new(
        pipeline: Arc<dyn ResetPipeline>,
        store: Arc<dyn QueueStore>,
        calendar: BusinessCalendar,
        config: SchedulerConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                pipeline,
                store,
                calendar,
                config,
                running: AtomicBool::new(false),
                state: Mutex::new(SchedulerState::default()),
                shutdown,
            }),
        }
    }

    /// Spawn the daily reset and weekly cleanup timers
    pub fn start(&self) -> QueueResult<()> {
        let mut state = self.inner.state.lock();
        if !state.timers.is_empty() {
            return Err(QueueError::Scheduler("scheduler already started".to_string()));
        }
        self.inner.shutdown.send_replace(false);

        let daily = {
            let scheduler = self.clone();
            let shutdown = self.inner.shutdown.subscribe();
            tokio::spawn(async move { scheduler.daily_loop(shutdown).await })
        };
        let weekly = {
            let scheduler = self.clone();
            let shutdown = self.inner.shutdown.subscribe();
            tokio::spawn(async move { scheduler.weekly_loop(shutdown).await })
        };
        state.timers = vec![daily, weekly];

        info!(
            timezone = self.inner.calendar.label(),
            next_reset = %self.next_reset_time(Utc::now()),
            "Daily reset scheduler started"
        );
        Ok(())
    }

    /// Signal the timers to stop and wait for them to exit
    pub async fn stop(&self) {
        self.inner.shutdown.send_replace(true);
        let timers = std::mem::take(&mut self.inner.state.lock().timers);
        for timer in timers {
            if let Err(e) = timer.await {
                warn!(error = %e, "Scheduler timer ended abnormally");
            }
        }
        info!("Daily reset scheduler stopped");
    }

    /// Run the reset now. Rejected while another run is in flight.
    pub async fn trigger_manual(&self) -> QueueResult<ResetRunOutcome> {
        if self.inner.running.load(Ordering::Acquire) {
            return Err(QueueError::ResetInProgress);
        }
        info!("Manual reset triggered");
        match self.execute(Attempt::Manual).await {
            ResetRunOutcome::AlreadyRunning => Err(QueueError::ResetInProgress),
            outcome => Ok(outcome),
        }
    }

    /// Run the reset as the midnight timer would
    pub async fn run_scheduled(&self) -> ResetRunOutcome {
        self.execute(Attempt::Scheduled).await
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.lock();
        SchedulerStatus {
            is_running: self.inner.running.load(Ordering::Acquire),
            is_scheduled: state.timers.iter().any(|t| !t.is_finished()),
            next_reset_time: self.next_reset_time(Utc::now()),
            last_reset: state.last_reset,
            timezone: self.inner.calendar.label().to_string(),
        }
    }

    pub fn next_reset_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let config = &self.inner.config;
        self.inner
            .calendar
            .next_daily(now, config.reset_hour, config.reset_minute)
    }

    /// Delete archive, event, snapshot and reset-log rows past retention
    #[instrument(skip(self))]
    pub async fn run_cleanup(&self) -> QueueResult<PurgeCounts> {
        let today = self.inner.calendar.today();
        let cutoff_date = today.date - ChronoDuration::days(self.inner.config.retention_days);
        let cutoff_at = self.inner.calendar.day_for_date(cutoff_date).starts_at;

        let counts = self.inner.store.purge_before(cutoff_date, cutoff_at).await?;
        info!(
            cutoff = %cutoff_date,
            history = counts.history,
            events = counts.events,
            snapshots = counts.snapshots,
            reset_logs = counts.reset_logs,
            "History cleanup completed"
        );
        Ok(counts)
    }

    async fn execute(&self, attempt: Attempt) -> ResetRunOutcome {
        let Some(_guard) = RunGuard::acquire(&self.inner.running) else {
            warn!(attempt = attempt.as_str(), "Daily reset already in progress, skipping");
            return ResetRunOutcome::AlreadyRunning;
        };

        let started = Instant::now();
        let business_date = self.inner.calendar.today().date;

        match self.inner.store.successful_reset_on(business_date).await {
            Ok(true) => {
                info!(
                    %business_date,
                    attempt = attempt.as_str(),
                    "Daily reset already performed today, skipping"
                );
                return ResetRunOutcome::AlreadyDoneToday;
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not check reset log, running reset"),
        }

        info!(%business_date, attempt = attempt.as_str(), "Starting daily queue reset");
        let result = self.inner.pipeline.run_reset().await;
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        match result {
            Ok(summary) => {
                self.inner.state.lock().last_reset = Some(Utc::now());
                self.log_attempt(ResetLogEntry::success(business_date, duration_ms))
                    .await;
                info!(
                    duration_ms,
                    cancelled = summary.cancelled_count,
                    completed = summary.completed_count,
                    archived = summary.archived_count,
                    "Daily reset completed successfully"
                );
                ResetRunOutcome::Completed { summary }
            }
            Err(e) => {
                let message = e.to_string();
                self.log_attempt(ResetLogEntry::failure(business_date, duration_ms, &message))
                    .await;

                if attempt == Attempt::Retry {
                    log_error(
                        "daily_reset_scheduler",
                        attempt.as_str(),
                        &message,
                        Some("retry failed, manual intervention required"),
                    );
                    return ResetRunOutcome::Failed {
                        error: message,
                        retry_scheduled: false,
                    };
                }

                error!(
                    error = %message,
                    retry_in_secs = self.inner.config.retry_delay.as_secs(),
                    "Daily reset failed, scheduling one retry"
                );
                self.schedule_retry();
                ResetRunOutcome::Failed {
                    error: message,
                    retry_scheduled: true,
                }
            }
        }
    }

    fn schedule_retry(&self) {
        let scheduler = self.clone();
        let delay = self.inner.config.retry_delay;
        let mut shutdown = self.inner.shutdown.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let outcome = scheduler.execute(Attempt::Retry).await;
                    debug!(?outcome, "Reset retry finished");
                }
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Scheduler stopped before reset retry ran");
                }
            }
        });
    }

    async fn log_attempt(&self, entry: ResetLogEntry) {
        if let Err(e) = self.inner.store.record_reset_attempt(&entry).await {
            warn!(error = %e, success = entry.success, "Failed to write reset log entry");
        }
    }

    async fn daily_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut next = self.next_reset_time(Utc::now());
        loop {
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            debug!(next_reset = %next, "Waiting for next daily reset");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let outcome = self.execute(Attempt::Scheduled).await;
                    debug!(?outcome, "Scheduled reset finished");
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }
            next = self.following_reset_time(next, Utc::now());
        }
    }

    /// Deadline after a reset that was due at `previous`: one day later, or
    /// the next local midnight after `now` if that is later still.
    pub fn following_reset_time(
        &self,
        previous: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let stepped = previous + ChronoDuration::days(1);
        stepped.max(self.next_reset_time(now))
    }

    async fn weekly_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let config = &self.inner.config;
        let next_cleanup = |now: DateTime<Utc>| {
            self.inner
                .calendar
                .next_weekly(now, config.cleanup_weekday, config.cleanup_hour)
        };

        let mut next = next_cleanup(Utc::now());
        loop {
            let wait = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.run_cleanup().await {
                        error!(error = %e, "History cleanup failed");
                    }
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }
            next = (next + ChronoDuration::weeks(1)).max(next_cleanup(Utc::now()));
        }
    }
}

/// Resolves once the shutdown flag is raised or the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryQueueStore;
    use chrono::TimeZone;

    struct NoopPipeline;

    #[async_trait]
    impl ResetPipeline for NoopPipeline {
        async fn run_reset(&self) -> QueueResult<ResetSummary> {
            Ok(ResetSummary::default())
        }
    }

    fn scheduler() -> DailyResetScheduler {
        let calendar = BusinessCalendar::from_offset_str("+08:00", "Asia/Manila").unwrap();
        DailyResetScheduler::new(
            Arc::new(NoopPipeline),
            Arc::new(MemoryQueueStore::new()),
            calendar,
            SchedulerConfig::default(),
        )
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_timer_futures_are_send() {
        let scheduler = scheduler();
        let (_tx, mut rx) = watch::channel(false);

        assert_send(scheduler.daily_loop(rx.clone()));
        assert_send(scheduler.weekly_loop(rx.clone()));
        assert_send(scheduler.execute(Attempt::Retry));
        assert_send(shutdown_requested(&mut rx));
    }

    #[test]
    fn test_following_reset_steps_from_previous_deadline() {
        let scheduler = scheduler();
        let due = Utc.with_ymd_and_hms(2024, 5, 2, 16, 0, 0).unwrap();

        // Woken a few ms before the wall clock reaches midnight
        let early = due - ChronoDuration::milliseconds(5);
        assert_eq!(
            scheduler.following_reset_time(due, early),
            Utc.with_ymd_and_hms(2024, 5, 3, 16, 0, 0).unwrap()
        );

        // Days missed while suspended are not replayed
        let late = Utc.with_ymd_and_hms(2024, 5, 5, 10, 0, 0).unwrap();
        assert_eq!(
            scheduler.following_reset_time(due, late),
            Utc.with_ymd_and_hms(2024, 5, 5, 16, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_run_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = RunGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(RunGuard::acquire(&flag).is_none());

        drop(first);
        assert!(!flag.load(Ordering::Acquire));
        assert!(RunGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.retry_delay, Duration::from_secs(300));
        assert_eq!(config.cleanup_weekday, Weekday::Sun);
        assert_eq!(config.cleanup_hour, 2);
        assert_eq!(config.retention_days, 365);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(ResetRunOutcome::AlreadyDoneToday).unwrap();
        assert_eq!(json["outcome"], "already_done_today");
    }
}
