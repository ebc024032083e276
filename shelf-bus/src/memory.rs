//! In-process notification bus.

use async_trait::async_trait;
use shelf_core::{BusError, BusResult};
use tracing::debug;

use crate::router::{TopicRouter, DEFAULT_QUEUE_CAPACITY};
use crate::{validate_topic, MessageHandler, NotificationBus, Subscription};

/// Notification bus that delivers within the current process.
///
/// Suitable for single-instance deployments and tests. Messages never leave
/// the process, so multiple service instances will not see each other's
/// publications.
pub struct InMemoryBus {
    router: TopicRouter,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            router: TopicRouter::new(capacity),
        }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.router.subscriber_count(topic)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: &str) -> BusResult<()> {
        self.router.ensure_open()?;
        validate_topic(topic)?;
        let receivers = self.router.dispatch(topic, payload);
        debug!(topic, receivers, "Published message");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> BusResult<Subscription> {
        validate_topic(topic).map_err(|e| BusError::SubscribeFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        self.router.register(topic, handler)
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> BusResult<()> {
        self.router.remove(subscription);
        Ok(())
    }

    async fn close(&self) -> BusResult<()> {
        self.router.close();
        debug!("In-memory bus closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BusMessage;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn collecting_handler() -> (MessageHandler, UnboundedReceiver<BusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |message| {
            let _ = tx.send(message);
        });
        (handler, rx)
    }

    async fn recv(rx: &mut UnboundedReceiver<BusMessage>) -> BusMessage {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("message should arrive")
            .expect("channel should be open")
    }

    async fn assert_silent(rx: &mut UnboundedReceiver<BusMessage>) {
        // A closed channel means the handler was dropped, which is silence too.
        let outcome = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(
            !matches!(outcome, Ok(Some(_))),
            "no message expected, got {:?}",
            outcome
        );
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_each_message() {
        let bus = InMemoryBus::new();
        let (h1, mut rx1) = collecting_handler();
        let (h2, mut rx2) = collecting_handler();
        bus.subscribe("product_changes", h1).await.expect("subscribe should succeed");
        bus.subscribe("product_changes", h2).await.expect("subscribe should succeed");

        bus.publish("product_changes", "{}").await.expect("publish should succeed");

        for rx in [&mut rx1, &mut rx2] {
            let message = recv(rx).await;
            assert_eq!(message.topic, "product_changes");
            assert_eq!(message.payload, "{}");
        }
    }

    #[tokio::test]
    async fn test_messages_arrive_in_publish_order() {
        let bus = InMemoryBus::new();
        let (handler, mut rx) = collecting_handler();
        bus.subscribe("alerts", handler).await.expect("subscribe should succeed");

        for i in 0..50 {
            bus.publish("alerts", &i.to_string())
                .await
                .expect("publish should succeed");
        }

        for i in 0..50 {
            assert_eq!(recv(&mut rx).await.payload, i.to_string());
        }
    }

    #[tokio::test]
    async fn test_message_without_subscriber_is_lost() {
        let bus = InMemoryBus::new();
        bus.publish("alerts", "early").await.expect("publish should succeed");

        let (handler, mut rx) = collecting_handler();
        bus.subscribe("alerts", handler).await.expect("subscribe should succeed");
        bus.publish("alerts", "late").await.expect("publish should succeed");

        assert_eq!(recv(&mut rx).await.payload, "late");
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryBus::new();
        let (handler, mut rx) = collecting_handler();
        bus.subscribe("alerts", handler).await.expect("subscribe should succeed");

        bus.publish("other", "x").await.expect("publish should succeed");
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = InMemoryBus::new();
        let (handler, mut rx) = collecting_handler();
        let sub = bus.subscribe("alerts", handler).await.expect("subscribe should succeed");

        bus.unsubscribe(&sub).await.expect("unsubscribe should succeed");
        assert_eq!(bus.subscriber_count("alerts"), 0);

        bus.publish("alerts", "x").await.expect("publish should succeed");
        assert_silent(&mut rx).await;

        // A second unsubscribe of the same handle is harmless.
        bus.unsubscribe(&sub).await.expect("unsubscribe should succeed");
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_use() {
        let bus = InMemoryBus::new();
        bus.close().await.expect("close should succeed");

        let (handler, _rx) = collecting_handler();
        assert_eq!(bus.publish("alerts", "x").await, Err(BusError::Closed));
        assert!(matches!(
            bus.subscribe("alerts", handler).await,
            Err(BusError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_invalid_topics_are_rejected() {
        let bus = InMemoryBus::new();
        assert!(matches!(
            bus.publish("", "x").await,
            Err(BusError::InvalidTopic { .. })
        ));

        let (handler, _rx) = collecting_handler();
        assert!(matches!(
            bus.subscribe("", handler).await,
            Err(BusError::SubscribeFailed { .. })
        ));
    }
}
