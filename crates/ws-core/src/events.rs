//! In-process event fan-out.
//!
//! Subscribers get a bounded queue each. Publishing never blocks: when a
//! subscriber's queue is full the event is dropped for that subscriber and
//! counted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Topic {
    Workspace(String),
    View(String),
    Codebase(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkspaceUpdated,
    ViewUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub topic: Topic,
    pub event_type: EventType,
    /// Id of the workspace or view the event is about.
    pub reference_id: String,
}

struct Subscriber {
    filter: Option<Topic>,
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

struct Inner {
    capacity: usize,
    next_id: AtomicU64,
    dropped_total: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

#[derive(Clone)]
pub struct EventPublisher {
    inner: Arc<Inner>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                dropped_total: AtomicU64::new(0),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a subscriber. `None` receives every topic.
    pub fn subscribe(&self, filter: Option<Topic>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        self.inner.subscribers.lock().insert(
            id,
            Subscriber {
                filter,
                sender,
                dropped: dropped.clone(),
            },
        );
        Subscription {
            id,
            receiver,
            dropped,
            publisher: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every matching subscriber. Returns how many
    /// subscribers received it.
    pub fn publish(&self, topic: Topic, event_type: EventType, reference_id: &str) -> usize {
        let event = Event {
            topic,
            event_type,
            reference_id: reference_id.to_string(),
        };

        let mut subscribers = self.inner.subscribers.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, sub) in subscribers.iter() {
            if sub.filter.as_ref().map_or(false, |f| *f != event.topic) {
                continue;
            }
            match sub.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    sub.dropped.fetch_add(1, Ordering::Relaxed);
                    self.inner.dropped_total.fetch_add(1, Ordering::Relaxed);
                    warn!(subscriber = id, topic = ?event.topic, "subscriber queue full, dropping event");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            subscribers.remove(&id);
        }

        debug!(topic = ?event.topic, event_type = ?event.event_type, delivered, "published event");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Events dropped across all subscribers because of full queues.
    pub fn dropped_total(&self) -> u64 {
        self.inner.dropped_total.load(Ordering::Relaxed)
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Event>,
    dropped: Arc<AtomicU64>,
    publisher: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Events this subscriber missed because its queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.publisher.upgrade() {
            inner.subscribers.lock().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_delivery() {
        let publisher = EventPublisher::new(8);
        let mut all = publisher.subscribe(None);
        let mut view = publisher.subscribe(Some(Topic::View("v1".into())));

        publisher.publish(Topic::Workspace("w1".into()), EventType::WorkspaceUpdated, "w1");
        publisher.publish(Topic::View("v1".into()), EventType::ViewUpdated, "v1");

        assert_eq!(all.try_recv().unwrap().reference_id, "w1");
        assert_eq!(all.try_recv().unwrap().event_type, EventType::ViewUpdated);
        let got = view.try_recv().unwrap();
        assert_eq!(got.topic, Topic::View("v1".into()));
        assert!(view.try_recv().is_none());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let publisher = EventPublisher::new(2);
        let mut slow = publisher.subscribe(None);

        for _ in 0..5 {
            publisher.publish(Topic::Codebase("c1".into()), EventType::ViewUpdated, "v1");
        }

        assert_eq!(slow.dropped(), 3);
        assert_eq!(publisher.dropped_total(), 3);
        assert!(slow.try_recv().is_some());
        assert!(slow.try_recv().is_some());
        assert!(slow.try_recv().is_none());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let publisher = EventPublisher::default();
        let sub = publisher.subscribe(None);
        assert_eq!(publisher.subscriber_count(), 1);
        drop(sub);
        assert_eq!(publisher.subscriber_count(), 0);
        assert_eq!(
            publisher.publish(Topic::View("v".into()), EventType::ViewUpdated, "v"),
            0
        );
    }

    #[tokio::test]
    async fn test_async_receive() {
        let publisher = EventPublisher::default();
        let mut sub = publisher.subscribe(Some(Topic::Workspace("w1".into())));
        publisher.publish(Topic::Workspace("w1".into()), EventType::WorkspaceUpdated, "w1");
        let event = sub.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::WorkspaceUpdated);
    }
}
