use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for LISTEN/NOTIFY, one channel per business.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a business's events. Creates the channel if needed.
    pub fn subscribe(&self, business_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(business_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an applied event. No-op if nobody is listening.
    pub fn send(&self, business_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&business_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a business's channel once the business is deleted.
    pub fn remove(&self, business_id: &Ulid) {
        self.channels.remove(business_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let bid = Ulid::new();
        let mut rx = hub.subscribe(bid);

        let event = Event::BusinessCreated {
            id: bid,
            name: "Shear Lock".into(),
            owner: "owner@example.com".into(),
        };
        hub.send(bid, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let bid = Ulid::new();
        // No subscriber; must not panic.
        hub.send(bid, &Event::BusinessDeleted { id: bid });
    }

    #[tokio::test]
    async fn removed_channel_stops_delivery() {
        let hub = NotifyHub::new();
        let bid = Ulid::new();
        let mut rx = hub.subscribe(bid);
        hub.remove(&bid);
        hub.send(bid, &Event::BusinessDeleted { id: bid });
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)));
    }
}
