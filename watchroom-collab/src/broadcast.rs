use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError, Receiver, Sender};

use crate::{RoomId, SyncEvent};

/// Fans out [SyncEvent]s to everyone subscribed to a room.
///
/// Delivery is best-effort. There is no replay for late subscribers, and subscribers that
/// fall further behind than the topic capacity skip ahead and are told how much they missed.
pub struct SyncBroadcaster {
    capacity: usize,
    topics: DashMap<RoomId, Sender<SyncEvent>>,
}

/// A subscription to a single room's topic
pub struct Subscription {
    room_id: RoomId,
    receiver: Receiver<SyncEvent>,
}

#[derive(Debug)]
pub enum Delivery {
    Event(SyncEvent),
    /// The subscriber fell behind and this many events were dropped
    Lagged(u64),
}

impl SyncBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Default::default(),
        }
    }

    /// Creates the topic for a room, if it doesn't exist already
    pub fn open(&self, room_id: RoomId) {
        self.topics
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
    }

    /// Subscribes to a room's topic. Returns [None] if the topic isn't open.
    pub fn subscribe(&self, room_id: RoomId) -> Option<Subscription> {
        self.topics.get(&room_id).map(|sender| Subscription {
            room_id,
            receiver: sender.subscribe(),
        })
    }

    /// Publishes an event to the topic of its room, returning how many subscribers will see it.
    pub fn publish(&self, event: SyncEvent) -> usize {
        match self.topics.get(&event.room_id()) {
            // Sending only fails if nobody is listening, which is fine
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Closes a room's topic. Subscribers receive what was already published, then the end.
    pub fn close(&self, room_id: RoomId) {
        self.topics.remove(&room_id);
    }

    pub fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.topics
            .get(&room_id)
            .map(|s| s.receiver_count())
            .unwrap_or_default()
    }
}

impl Subscription {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Waits for the next delivery. Returns [None] once the topic is closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        match self.receiver.recv().await {
            Ok(event) => Some(Delivery::Event(event)),
            Err(RecvError::Lagged(amount)) => Some(Delivery::Lagged(amount)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Returns the next event if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        use tokio::sync::broadcast::error::TryRecvError;

        match self.receiver.try_recv() {
            Ok(event) => Some(Delivery::Event(event)),
            Err(TryRecvError::Lagged(amount)) => Some(Delivery::Lagged(amount)),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use watchroom_core::{PlaybackAction, PlaybackSnapshot};

    use super::*;

    fn playback_event(room_id: RoomId, position: f64) -> SyncEvent {
        SyncEvent::Playback {
            room_id,
            issued_by: 1,
            snapshot: PlaybackSnapshot {
                action: PlaybackAction::Seek,
                is_playing: false,
                current_position: position,
                server_timestamp: Utc::now(),
            },
        }
    }

    fn position(delivery: Option<Delivery>) -> f64 {
        match delivery {
            Some(Delivery::Event(SyncEvent::Playback { snapshot, .. })) => {
                snapshot.current_position
            }
            other => panic!("expected a playback event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let broadcaster = SyncBroadcaster::new(16);
        broadcaster.open(1);

        let mut first = broadcaster.subscribe(1).unwrap();
        let mut second = broadcaster.subscribe(1).unwrap();
        assert_eq!(broadcaster.subscriber_count(1), 2);

        for i in 0..5 {
            assert_eq!(broadcaster.publish(playback_event(1, i as f64)), 2);
        }

        for i in 0..5 {
            assert_eq!(position(first.recv().await), i as f64);
            assert_eq!(position(second.recv().await), i as f64);
        }
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let broadcaster = SyncBroadcaster::new(16);
        broadcaster.open(1);
        broadcaster.open(2);

        let mut other = broadcaster.subscribe(2).unwrap();
        broadcaster.publish(playback_event(1, 3.));

        assert!(other.try_recv().is_none());
        assert!(broadcaster.subscribe(3).is_none());
        assert_eq!(broadcaster.publish(playback_event(3, 1.)), 0);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let broadcaster = SyncBroadcaster::new(16);
        broadcaster.open(1);

        let mut subscription = broadcaster.subscribe(1).unwrap();
        broadcaster.publish(playback_event(1, 9.));
        broadcaster.close(1);

        assert_eq!(position(subscription.recv().await), 9.);
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let broadcaster = SyncBroadcaster::new(2);
        broadcaster.open(1);

        let mut subscription = broadcaster.subscribe(1).unwrap();

        for i in 0..5 {
            broadcaster.publish(playback_event(1, i as f64));
        }

        assert!(matches!(
            subscription.recv().await,
            Some(Delivery::Lagged(3))
        ));
        assert_eq!(position(subscription.recv().await), 3.);
    }
}
