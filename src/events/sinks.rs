//! Side-channel sink traits and the store-backed analytics sink.

use super::payloads::RealtimeMessage;
use crate::calendar::BusinessDay;
use crate::database::QueueStore;
use crate::error::QueueError;
use crate::models::NewQueueEvent;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("analytics sink failed: {0}")]
    Analytics(String),

    #[error("realtime sink failed: {0}")]
    Realtime(String),

    #[error("delivery timed out after {0}ms")]
    Timeout(u128),

    #[error("store write failed: {0}")]
    Store(#[from] QueueError),
}

impl From<SinkError> for QueueError {
    fn from(err: SinkError) -> Self {
        QueueError::SideChannel(err.to_string())
    }
}

/// Receives lifecycle events for analytics. Delivery is at-most-once.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record_queue_event(&self, event: &NewQueueEvent) -> Result<(), SinkError>;

    /// Ask the analytics side to recompute aggregates for `day`
    async fn trigger_recompute(&self, day: BusinessDay) -> Result<(), SinkError>;
}

/// Pushes notifications to connected displays and clients
#[async_trait]
pub trait RealtimeSink: Send + Sync {
    async fn broadcast(&self, message: &RealtimeMessage) -> Result<(), SinkError>;
}

/// Writes events to `queue_events` and recomputes `daily_queue_history`
#[derive(Clone)]
pub struct StoreAnalyticsSink {
    store: Arc<dyn QueueStore>,
}

impl StoreAnalyticsSink {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for StoreAnalyticsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAnalyticsSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl AnalyticsSink for StoreAnalyticsSink {
    async fn record_queue_event(&self, event: &NewQueueEvent) -> Result<(), SinkError> {
        self.store.insert_queue_event(event).await?;
        Ok(())
    }

    async fn trigger_recompute(&self, day: BusinessDay) -> Result<(), SinkError> {
        let snapshot = self.store.refresh_daily_snapshot(day).await?;
        debug!(
            date = %snapshot.date,
            total = snapshot.total_customers,
            avg_wait = snapshot.avg_wait_minutes,
            "Daily queue snapshot refreshed"
        );
        Ok(())
    }
}
