//! In-process event bus backed by a tokio broadcast channel.

use std::future::Future;

use tokio::sync::broadcast;

use devlink_domain::error::LinkError;
use devlink_domain::event::Event;

use crate::ports::EventPublisher;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
#[derive(Clone)]
pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events published *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), LinkError>> + Send {
        tracing::trace!(
            event_type = %event.event_type,
            entry_id = ?event.entry_id,
            "publishing event"
        );
        // Only fails when nobody listens.
        let _ = self.sender.send(event);
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devlink_domain::event::EventType;
    use devlink_domain::id::EntryId;

    #[tokio::test]
    async fn should_deliver_event_to_every_subscriber() {
        let bus = InProcessEventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = Event::new(
            EventType::EntryStateChanged,
            Some(EntryId::new()),
            serde_json::json!({"from": "not_loaded", "to": "loaded"}),
        );
        let event_id = event.id;
        bus.publish(event).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().id, event_id);
        assert_eq!(rx2.recv().await.unwrap().id, event_id);
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessEventBus::new(16);
        let event = Event::new(EventType::SweepCompleted, None, serde_json::json!({}));
        assert!(bus.publish(event).await.is_ok());
    }

    #[tokio::test]
    async fn should_share_channel_between_clones() {
        let bus = InProcessEventBus::new(16);
        let mut rx = bus.subscribe();
        let clone = bus.clone();

        let event = Event::new(EventType::DeviceDiscovered, None, serde_json::json!({}));
        let event_id = event.id;
        clone.publish(event).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().id, event_id);
    }
}
