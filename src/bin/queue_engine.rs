//! Queue Engine Binary
//!
//! Runs the daily reset scheduler against PostgreSQL and relays realtime
//! messages to the log until a shutdown signal arrives. Counter operations
//! are driven by the embedding service through the library API.

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use queue_core::config::ConfigLoader;
use queue_core::database::{DatabaseConnection, PgQueueStore, QueueStore};
use queue_core::events::{BroadcastRealtimeSink, SideChannelDispatcher, StoreAnalyticsSink};
use queue_core::logging;
use queue_core::queue::{ArchivalCoordinator, QueueOperations};
use queue_core::scheduler::DailyResetScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loader = ConfigLoader::from_env();
    let config = loader.load().context("loading queue configuration")?;
    logging::init_logging(&config.logging);

    info!(
        environment = loader.environment(),
        timezone = %config.queue.timezone_label,
        "Starting queue engine"
    );

    let calendar = config.calendar()?;
    let scheduler_config = config.scheduler_config()?;

    let db = DatabaseConnection::connect(&config.database)
        .await
        .context("connecting to database")?;
    let pg_store = PgQueueStore::new(db.pool().clone());
    if config.database.run_migrations {
        pg_store.migrate().await.context("running migrations")?;
    }
    let store: Arc<dyn QueueStore> = Arc::new(pg_store);

    let realtime = Arc::new(BroadcastRealtimeSink::new(config.events.broadcast_capacity));
    let mut feed = realtime.subscribe();
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(published) => {
                    debug!(channel = published.channel, "Realtime message published")
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Realtime relay lagged behind publisher")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let dispatcher = SideChannelDispatcher::with_config(
        Arc::new(StoreAnalyticsSink::new(store.clone())),
        realtime,
        config.dispatcher_config(),
    );

    let operations = QueueOperations::new(store.clone(), dispatcher.clone(), calendar.clone())
        .with_average_service_minutes(config.queue.average_service_minutes);
    let coordinator = Arc::new(ArchivalCoordinator::new(
        store.clone(),
        dispatcher.clone(),
        calendar.clone(),
    ));
    let scheduler = DailyResetScheduler::new(coordinator, store, calendar, scheduler_config);

    let counters = operations.list_counters().await?;
    info!(
        counters = counters.len(),
        active = counters.iter().filter(|c| c.is_active).count(),
        "Queue engine ready"
    );

    if config.scheduler.enabled {
        scheduler.start()?;
        let status = scheduler.status();
        info!(next_reset = %status.next_reset_time, "Daily reset scheduled");
    } else {
        warn!("Daily reset scheduler disabled by configuration");
    }

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.stop().await;
    dispatcher.flush().await;
    let stats = dispatcher.stats();
    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        "Side channels drained"
    );

    db.close().await;
    info!("Queue engine stopped");

    Ok(())
}
