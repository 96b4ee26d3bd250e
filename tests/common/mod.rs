#![allow(dead_code)]

pub mod builders;
pub mod strategies;

use async_trait::async_trait;
use parking_lot::Mutex;
use queue_core::calendar::BusinessCalendar;
use queue_core::database::MemoryQueueStore;
use queue_core::events::{
    RealtimeMessage, RealtimeSink, SideChannelDispatcher, SinkError, StoreAnalyticsSink,
};
use queue_core::models::Counter;
use queue_core::queue::{ArchivalCoordinator, QueueOperations};
use queue_core::state_machine::Role;
use std::sync::Arc;

pub use builders::*;

/// Realtime sink that keeps every message for assertions
#[derive(Debug, Default)]
pub struct RecordingRealtime {
    messages: Mutex<Vec<RealtimeMessage>>,
}

impl RecordingRealtime {
    pub fn messages(&self) -> Vec<RealtimeMessage> {
        self.messages.lock().clone()
    }

    pub fn on_channel(&self, channel: &str) -> Vec<RealtimeMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.channel() == channel)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[async_trait]
impl RealtimeSink for RecordingRealtime {
    async fn broadcast(&self, message: &RealtimeMessage) -> Result<(), SinkError> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

/// In-memory engine wired the way the binary wires the Postgres one
pub struct QueueHarness {
    pub store: Arc<MemoryQueueStore>,
    pub realtime: Arc<RecordingRealtime>,
    pub dispatcher: SideChannelDispatcher,
    pub calendar: BusinessCalendar,
    pub ops: QueueOperations,
}

impl QueueHarness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryQueueStore::new());
        let realtime = Arc::new(RecordingRealtime::default());
        let dispatcher = SideChannelDispatcher::spawn(
            Arc::new(StoreAnalyticsSink::new(store.clone())),
            realtime.clone(),
        );
        let calendar = test_calendar();
        let ops = QueueOperations::new(store.clone(), dispatcher.clone(), calendar.clone());

        Self {
            store,
            realtime,
            dispatcher,
            calendar,
            ops,
        }
    }

    pub fn coordinator(&self) -> ArchivalCoordinator {
        ArchivalCoordinator::new(
            self.store.clone(),
            self.dispatcher.clone(),
            self.calendar.clone(),
        )
    }

    pub async fn counter(&self, name: &str) -> Counter {
        self.ops
            .create_counter(name, &Role::Admin)
            .await
            .expect("counter should be created")
    }

    /// Wait for queued analytics and realtime effects to land
    pub async fn settle(&self) {
        self.dispatcher.flush().await;
    }
}

pub fn test_calendar() -> BusinessCalendar {
    BusinessCalendar::from_offset_str("+08:00", "Asia/Manila").expect("valid offset")
}
