use super::payloads::RealtimeMessage;
use super::sinks::{RealtimeSink, SinkError};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// In-process realtime publisher the transport layer subscribes to
#[derive(Debug, Clone)]
pub struct BroadcastRealtimeSink {
    sender: broadcast::Sender<PublishedMessage>,
}

/// Message that has been published
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub channel: &'static str,
    pub message: RealtimeMessage,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl BroadcastRealtimeSink {
    /// Create a new publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastRealtimeSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl RealtimeSink for BroadcastRealtimeSink {
    async fn broadcast(&self, message: &RealtimeMessage) -> Result<(), SinkError> {
        let published = PublishedMessage {
            channel: message.channel(),
            message: message.clone(),
            published_at: chrono::Utc::now(),
        };

        // send() only fails when nobody is subscribed, which is fine for a display feed
        let _ = self.sender.send(published);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::payloads::{QueueUpdate, QueueUpdateKind};

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let sink = BroadcastRealtimeSink::new(8);
        let message = RealtimeMessage::QueueUpdate(QueueUpdate::new(
            QueueUpdateKind::CustomerJoined,
            None,
            0,
        ));
        assert!(sink.broadcast(&message).await.is_ok());
        assert_eq!(sink.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_channel_name() {
        let sink = BroadcastRealtimeSink::default();
        let mut rx = sink.subscribe();
        let message = RealtimeMessage::QueueUpdate(QueueUpdate::new(
            QueueUpdateKind::CustomerCalled,
            None,
            1,
        ));

        sink.broadcast(&message).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.channel, "queue:update");
        assert_eq!(received.message, message);
    }
}
