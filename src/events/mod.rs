//! # Side Channels
//!
//! Analytics and realtime notifications emitted after a queue mutation has
//! committed. Sinks are traits so the engine stays independent of the
//! analytics backend and the realtime transport.

pub mod dispatcher;
pub mod payloads;
pub mod publisher;
pub mod sinks;

pub use dispatcher::{DispatcherConfig, DispatcherStats, SideChannelDispatcher};
pub use payloads::{
    QueueResetNotice, QueueUpdate, QueueUpdateKind, RealtimeMessage, StatusChanged,
    QUEUE_RESET_CHANNEL, QUEUE_UPDATE_CHANNEL, STATUS_CHANGED_CHANNEL,
};
pub use publisher::{BroadcastRealtimeSink, PublishedMessage};
pub use sinks::{AnalyticsSink, RealtimeSink, SinkError, StoreAnalyticsSink};
