//! In-process post lifecycle event bus.
//!
//! Publish/unpublish/delete transitions are announced on a broadcast channel;
//! the notification dispatcher worker is the main consumer. Sending with no
//! receivers is not an error: events are advisory, the database is the source
//! of truth.

use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum PostEvent {
    Published { post_id: Uuid, notify: bool },
    Unpublished { post_id: Uuid },
    Deleted { post_id: Uuid },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PostEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: PostEvent) {
        if let Err(err) = self.tx.send(event) {
            tracing::debug!("post event dropped, no subscribers: {}", err);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PostEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let post_id = Uuid::new_v4();
        bus.publish(PostEvent::Published {
            post_id,
            notify: true,
        });

        match rx.recv().await.expect("event") {
            PostEvent::Published {
                post_id: got,
                notify,
            } => {
                assert_eq!(got, post_id);
                assert!(notify);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_does_not_panic() {
        let bus = EventBus::new(8);
        bus.publish(PostEvent::Deleted {
            post_id: Uuid::new_v4(),
        });
    }
}
