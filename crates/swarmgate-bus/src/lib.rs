//! Swarmgate Event Bus - in-process topic fan-out
//!
//! One process-wide structure mapping `topic -> (subscriber channels,
//! handler callbacks)`. Delivery is exact-topic (no wildcard matching at
//! publish time for queues); handlers registered for `"*"` receive every
//! publish.
//!
//! Subscriber queues are bounded broadcast channels: per-subscriber delivery
//! preserves publish order, and a lagging subscriber loses the oldest
//! messages rather than blocking publishers. Registration mutates the topic
//! table under a lock; delivery works on a snapshot taken outside it.

use std::collections::HashMap;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default per-topic queue capacity before the oldest message is dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A registered handler: `(topic, payload) -> future`.
pub type Handler = Arc<dyn Fn(String, Value) -> BoxFuture<'static, ()> + Send + Sync>;

struct HandlerEntry {
    topic: String,
    handler: Handler,
}

/// The process-wide bus.
pub struct EventBus {
    topics: RwLock<HashMap<String, broadcast::Sender<Value>>>,
    handlers: RwLock<Vec<HandlerEntry>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// Register a fresh subscriber queue for one topic.
    ///
    /// Dropping the receiver deregisters it; the sender side notices on the
    /// next publish and carries on.
    pub fn subscribe_queue(&self, topic: &str) -> broadcast::Receiver<Value> {
        let mut topics = self.topics.write();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Register a handler for one topic, or `"*"` for every publish.
    /// Handlers are registered during startup wiring, not at publish time.
    pub fn register_handler(&self, topic: impl Into<String>, handler: Handler) {
        self.handlers.write().push(HandlerEntry {
            topic: topic.into(),
            handler,
        });
    }

    /// Deliver to all queues registered for exactly this topic, then invoke
    /// matching handlers. Queue delivery is fire-and-forget.
    pub async fn publish(&self, topic: &str, message: Value) {
        // Snapshot under the read locks; never hold them across await.
        let sender = self.topics.read().get(topic).cloned();
        let handlers: Vec<(String, Handler)> = self
            .handlers
            .read()
            .iter()
            .filter(|entry| entry.topic == "*" || entry.topic == topic)
            .map(|entry| (entry.topic.clone(), entry.handler.clone()))
            .collect();

        if let Some(sender) = sender {
            // No receivers is fine; lagged receivers drop the oldest.
            let _ = sender.send(message.clone());
        }

        for (_, handler) in handlers {
            (*handler)(topic.to_string(), message.clone()).await;
        }
    }

    /// Number of live subscriber queues for a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_queue_receives_published_message() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_queue("fusion.topic");

        bus.publish("fusion.topic", serde_json::json!({"track_id": "TEST-123"}))
            .await;

        let message = rx.recv().await.unwrap();
        assert_eq!(message["track_id"], "TEST-123");
    }

    #[tokio::test]
    async fn test_exact_topic_delivery_only() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_queue("topic.a");

        bus.publish("topic.b", serde_json::json!({"n": 1})).await;
        bus.publish("topic.a", serde_json::json!({"n": 2})).await;

        let message = rx.recv().await.unwrap();
        assert_eq!(message["n"], 2);
    }

    #[tokio::test]
    async fn test_per_subscriber_order_preserved() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_queue("ordered");

        for n in 0..10 {
            bus.publish("ordered", serde_json::json!({"n": n})).await;
        }

        for n in 0..10 {
            assert_eq!(rx.recv().await.unwrap()["n"], n);
        }
    }

    #[tokio::test]
    async fn test_lagging_subscriber_drops_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe_queue("bounded");

        for n in 0..5 {
            bus.publish("bounded", serde_json::json!({"n": n})).await;
        }

        // The first recv reports the lag, then the newest two arrive.
        match rx.recv().await {
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                assert_eq!(skipped, 3)
            }
            other => panic!("expected lag, got {other:?}"),
        }
        assert_eq!(rx.recv().await.unwrap()["n"], 3);
        assert_eq!(rx.recv().await.unwrap()["n"], 4);
    }

    #[tokio::test]
    async fn test_wildcard_handler_sees_every_topic() {
        let bus = EventBus::default();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.register_handler("*", Arc::new(move |topic, _payload| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().push(topic);
            })
        }));

        let sink = seen.clone();
        bus.register_handler("only.this", Arc::new(move |topic, _payload| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().push(format!("exact:{topic}"));
            })
        }));

        bus.publish("only.this", serde_json::json!({})).await;
        bus.publish("other.topic", serde_json::json!({})).await;

        let events = seen.lock().clone();
        assert_eq!(events, vec!["only.this", "exact:only.this", "other.topic"]);
    }

    #[tokio::test]
    async fn test_dropped_receiver_deregisters() {
        let bus = EventBus::default();
        let rx = bus.subscribe_queue("ephemeral");
        assert_eq!(bus.subscriber_count("ephemeral"), 1);

        drop(rx);
        // Publishing to a topic with no receivers is not an error.
        bus.publish("ephemeral", serde_json::json!({})).await;
        assert_eq!(bus.subscriber_count("ephemeral"), 0);
    }
}
