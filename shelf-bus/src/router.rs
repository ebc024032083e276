//! Per-subscription dispatch shared by every bus transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use shelf_core::{BusError, BusResult};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{BusMessage, MessageHandler, Subscription};

/// Queued messages per subscription before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

struct Slot {
    id: u64,
    sender: mpsc::Sender<BusMessage>,
    worker: JoinHandle<()>,
}

/// Routes published messages to the subscriptions of their topic.
///
/// Each subscription gets a bounded queue and a task that feeds it to the
/// handler in order. Dispatch never blocks: a full queue drops the message.
/// Must be used from within a Tokio runtime.
pub struct TopicRouter {
    topics: RwLock<HashMap<String, Vec<Slot>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    closed: AtomicBool,
}

impl TopicRouter {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<Slot>>> {
        self.topics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<Slot>>> {
        self.topics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn ensure_open(&self) -> BusResult<()> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    /// Register a handler and start its delivery task.
    pub fn register(&self, topic: &str, handler: MessageHandler) -> BusResult<Subscription> {
        self.ensure_open()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, mut receiver) = mpsc::channel::<BusMessage>(self.queue_capacity);
        let worker = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                handler(message);
            }
        });

        self.write()
            .entry(topic.to_string())
            .or_default()
            .push(Slot { id, sender, worker });

        debug!(topic, subscription_id = id, "Subscription registered");
        Ok(Subscription::new(id, topic))
    }

    /// Remove a subscription. Returns `true` when its topic has no
    /// subscribers left.
    pub fn remove(&self, subscription: &Subscription) -> bool {
        let mut topics = self.write();
        let Some(slots) = topics.get_mut(subscription.topic()) else {
            return false;
        };

        if let Some(pos) = slots.iter().position(|slot| slot.id == subscription.id()) {
            let slot = slots.remove(pos);
            slot.worker.abort();
            debug!(%subscription, "Subscription removed");
        }

        if slots.is_empty() {
            topics.remove(subscription.topic());
            true
        } else {
            false
        }
    }

    /// Queue a message for every subscriber of `topic`.
    ///
    /// Every copy carries the same sequence stamp, taken before this returns.
    /// Returns how many subscriptions accepted it.
    pub fn dispatch(&self, topic: &str, payload: &str) -> usize {
        let topics = self.read();
        let Some(slots) = topics.get(topic) else {
            debug!(topic, "No subscribers, message dropped");
            return 0;
        };

        let message = BusMessage::new(topic, payload);
        let mut delivered = 0;
        for slot in slots {
            match slot.sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(topic, subscription_id = slot.id, "Subscriber queue full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(topic, subscription_id = slot.id, "Subscriber gone, message dropped");
                }
            }
        }
        delivered
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.read().get(topic).map(Vec::len).unwrap_or(0)
    }

    /// Topics with at least one subscription.
    pub fn topics(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Drop every subscription and refuse new ones.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut topics = self.write();
        for (_, slots) in topics.drain() {
            for slot in slots {
                slot.worker.abort();
            }
        }
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl Drop for TopicRouter {
    fn drop(&mut self) {
        let topics = self
            .topics
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, slots) in topics.drain() {
            for slot in slots {
                slot.worker.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

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

    #[tokio::test]
    async fn test_dispatch_without_subscribers_is_dropped() {
        let router = TopicRouter::default();
        assert_eq!(router.dispatch("nobody", "hello"), 0);
    }

    #[tokio::test]
    async fn test_dispatch_stamps_before_returning() {
        let router = TopicRouter::default();
        let (h1, mut rx1) = collecting_handler();
        let (h2, mut rx2) = collecting_handler();
        router.register("t", h1).expect("register should succeed");
        router.register("t", h2).expect("register should succeed");

        router.dispatch("t", "x");
        let after = crate::next_sequence();

        let a = recv(&mut rx1).await;
        let b = recv(&mut rx2).await;
        assert_eq!(a.sequence, b.sequence);
        assert!(a.sequence < after);
    }

    #[tokio::test]
    async fn test_remove_reports_last_subscriber() {
        let router = TopicRouter::default();
        let (h1, _rx1) = collecting_handler();
        let (h2, _rx2) = collecting_handler();

        let a = router.register("t", h1).expect("register should succeed");
        let b = router.register("t", h2).expect("register should succeed");
        assert_eq!(router.subscriber_count("t"), 2);

        assert!(!router.remove(&a));
        assert!(router.remove(&b));
        assert_eq!(router.subscriber_count("t"), 0);
        assert!(router.topics().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_messages() {
        // current_thread runtime: the worker cannot drain until this task yields.
        let router = TopicRouter::new(1);
        let (handler, mut rx) = collecting_handler();
        router.register("t", handler).expect("register should succeed");

        let accepted: usize = (1..=5).map(|i| router.dispatch("t", &i.to_string())).sum();
        assert_eq!(accepted, 1);

        assert_eq!(recv(&mut rx).await.payload, "1");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_removed_subscription_stops_receiving() {
        let router = TopicRouter::default();
        let (handler, mut rx) = collecting_handler();
        let sub = router.register("t", handler).expect("register should succeed");

        router.dispatch("t", "before");
        assert_eq!(recv(&mut rx).await.payload, "before");

        router.remove(&sub);
        assert_eq!(router.dispatch("t", "after"), 0);
    }

    #[tokio::test]
    async fn test_closed_router_rejects_registration() {
        let router = TopicRouter::default();
        router.close();
        let (handler, _rx) = collecting_handler();
        assert!(matches!(router.register("t", handler), Err(BusError::Closed)));
        assert_eq!(router.dispatch("t", "x"), 0);
    }
}
