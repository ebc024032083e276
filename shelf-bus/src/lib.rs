//! SHELF Bus - Notification Bus
//!
//! A publish/subscribe channel keyed by topic name. Delivery is at-most-once
//! and best-effort:
//!
//! - A message published while nobody listens on its topic is lost.
//! - Every subscriber of a topic receives every message (fan-out).
//! - A single subscriber sees a topic's messages in publish order.
//! - `publish` returns once the message is handed to the transport; it never
//!   waits for handlers to run.
//!
//! ## Architecture
//!
//! Both transports share a [`TopicRouter`]: each subscription owns a bounded
//! queue drained by its own task, which is what gives per-subscriber FIFO
//! without letting a slow handler stall the publisher. [`InMemoryBus`] feeds
//! the router directly; [`PgNotifyBus`] feeds it from PostgreSQL
//! `LISTEN`/`NOTIFY`.

pub mod memory;
pub mod postgres;
pub mod router;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use shelf_core::{BusError, BusResult, MAX_TOPIC_LEN};

pub use memory::InMemoryBus;
pub use postgres::PgNotifyBus;
pub use router::{TopicRouter, DEFAULT_QUEUE_CAPACITY};

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Take the next value of the process-wide dispatch sequence.
///
/// Values are strictly increasing. A message stamped lower than a value
/// taken elsewhere was dispatched before that point.
pub fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

/// A message as delivered to a subscription handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
    /// When the transport dispatched it, on the [`next_sequence`] scale.
    pub sequence: u64,
}

impl BusMessage {
    /// Build a message stamped with the next sequence value.
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            sequence: next_sequence(),
        }
    }
}

/// Callback run for every message delivered to a subscription.
///
/// Handlers run on the subscription's own task and must not block.
pub type MessageHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    topic: String,
}

impl Subscription {
    pub(crate) fn new(id: u64, topic: impl Into<String>) -> Self {
        Self {
            id,
            topic: topic.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.topic, self.id)
    }
}

/// Publish/subscribe transport.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// Hand `payload` to every current subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: &str) -> BusResult<()>;

    /// Register `handler` for every message published on `topic` from now on.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> BusResult<Subscription>;

    /// Stop delivering to `subscription`. Unknown handles are ignored.
    async fn unsubscribe(&self, subscription: &Subscription) -> BusResult<()>;

    /// Drop every subscription and refuse further use.
    async fn close(&self) -> BusResult<()>;
}

/// Check a topic name is usable on every transport.
pub fn validate_topic(topic: &str) -> BusResult<()> {
    if topic.is_empty() {
        return Err(BusError::InvalidTopic {
            topic: topic.to_string(),
            reason: "topic must not be empty".to_string(),
        });
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(BusError::InvalidTopic {
            topic: topic.to_string(),
            reason: format!("topic must be at most {} bytes", MAX_TOPIC_LEN),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_topic() {
        assert!(validate_topic("alerts").is_ok());
        assert!(validate_topic(&"x".repeat(MAX_TOPIC_LEN)).is_ok());

        assert!(matches!(
            validate_topic(""),
            Err(BusError::InvalidTopic { .. })
        ));
        assert!(matches!(
            validate_topic(&"x".repeat(MAX_TOPIC_LEN + 1)),
            Err(BusError::InvalidTopic { .. })
        ));
    }

    #[test]
    fn test_messages_are_stamped_in_creation_order() {
        let first = BusMessage::new("alerts", "a");
        let mark = next_sequence();
        let second = BusMessage::new("alerts", "b");
        assert!(first.sequence < mark);
        assert!(mark < second.sequence);
    }

    #[test]
    fn test_subscription_display() {
        let sub = Subscription::new(3, "alerts");
        assert_eq!(sub.to_string(), "alerts#3");
        assert_eq!(sub.topic(), "alerts");
        assert_eq!(sub.id(), 3);
    }
}
