//! # Side-Channel Dispatcher
//!
//! Hands analytics events and realtime messages to a background task after
//! the owning transaction has committed. Callers never wait on a sink and
//! never see a sink error: each delivery gets one attempt under a timeout,
//! failures are logged and counted, and nothing is retried (at-most-once,
//! best-effort).
//!
//! Effects are delivered in submission order. [`SideChannelDispatcher::flush`]
//! resolves once everything submitted before it has been attempted, which is
//! what shutdown and tests use to observe delivery.

use super::payloads::RealtimeMessage;
use super::sinks::{AnalyticsSink, RealtimeSink, SinkError};
use crate::calendar::BusinessDay;
use crate::models::NewQueueEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on a single sink call
    pub delivery_timeout: Duration,
    /// Correlation ID for distributed tracing
    pub correlation_id: Option<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(5),
            correlation_id: None,
        }
    }
}

#[derive(Debug)]
enum SideEffect {
    Record(NewQueueEvent),
    Recompute(BusinessDay),
    Broadcast(RealtimeMessage),
    Flush(oneshot::Sender<()>),
}

impl SideEffect {
    fn label(&self) -> &'static str {
        match self {
            Self::Record(_) => "record_queue_event",
            Self::Recompute(_) => "trigger_recompute",
            Self::Broadcast(_) => "broadcast",
            Self::Flush(_) => "flush",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatcherStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Cloneable handle; the worker stops once every handle is dropped
#[derive(Debug, Clone)]
pub struct SideChannelDispatcher {
    queue: mpsc::UnboundedSender<SideEffect>,
    counters: Arc<Counters>,
    correlation_id: String,
}

impl SideChannelDispatcher {
    /// Start the delivery worker on the current tokio runtime
    pub fn spawn(analytics: Arc<dyn AnalyticsSink>, realtime: Arc<dyn RealtimeSink>) -> Self {
        Self::with_config(analytics, realtime, DispatcherConfig::default())
    }

    pub fn with_config(
        analytics: Arc<dyn AnalyticsSink>,
        realtime: Arc<dyn RealtimeSink>,
        config: DispatcherConfig,
    ) -> Self {
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let correlation_id = config
            .correlation_id
            .clone()
            .unwrap_or_else(|| format!("side_{}", &Uuid::new_v4().to_string()[..8]));
        let counters = Arc::new(Counters::default());

        Self::start_worker(
            queue_rx,
            analytics,
            realtime,
            Arc::clone(&counters),
            correlation_id.clone(),
            config.delivery_timeout,
        );

        info!(correlation_id = %correlation_id, "Side-channel dispatcher started");

        Self {
            queue,
            counters,
            correlation_id,
        }
    }

    pub fn record(&self, event: NewQueueEvent) {
        self.submit(SideEffect::Record(event));
    }

    pub fn recompute(&self, day: BusinessDay) {
        self.submit(SideEffect::Recompute(day));
    }

    pub fn broadcast(&self, message: RealtimeMessage) {
        self.submit(SideEffect::Broadcast(message));
    }

    /// Wait until every effect submitted so far has been attempted
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.queue.send(SideEffect::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn submit(&self, effect: SideEffect) {
        let label = effect.label();
        if self.queue.send(effect).is_err() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                correlation_id = %self.correlation_id,
                effect = label,
                "Side-channel worker is gone, dropping effect"
            );
        }
    }

    fn start_worker(
        mut queue_rx: mpsc::UnboundedReceiver<SideEffect>,
        analytics: Arc<dyn AnalyticsSink>,
        realtime: Arc<dyn RealtimeSink>,
        counters: Arc<Counters>,
        correlation_id: String,
        delivery_timeout: Duration,
    ) {
        tokio::spawn(async move {
            while let Some(effect) = queue_rx.recv().await {
                let label = effect.label();
                let attempt: Result<(), SinkError> = match effect {
                    SideEffect::Flush(ack) => {
                        let _ = ack.send(());
                        continue;
                    }
                    SideEffect::Record(event) => {
                        Self::bounded(delivery_timeout, analytics.record_queue_event(&event)).await
                    }
                    SideEffect::Recompute(day) => {
                        Self::bounded(delivery_timeout, analytics.trigger_recompute(day)).await
                    }
                    SideEffect::Broadcast(message) => {
                        Self::bounded(delivery_timeout, realtime.broadcast(&message)).await
                    }
                };

                match attempt {
                    Ok(()) => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            correlation_id = %correlation_id,
                            effect = label,
                            "Side effect delivered"
                        );
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            correlation_id = %correlation_id,
                            effect = label,
                            error = %e,
                            "Side effect failed, not retrying"
                        );
                    }
                }
            }
            debug!(correlation_id = %correlation_id, "Side-channel worker stopped");
        });
    }

    async fn bounded<F>(limit: Duration, delivery: F) -> Result<(), SinkError>
    where
        F: std::future::Future<Output = Result<(), SinkError>>,
    {
        match timeout(limit, delivery).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(limit.as_millis())),
        }
    }
}
