//! PostgreSQL `LISTEN`/`NOTIFY` notification bus.
//!
//! Publishing goes through the shared connection pool with `pg_notify`.
//! Receiving needs a connection that stays open, so the bus owns one
//! dedicated connection whose driver task forwards notifications into the
//! [`TopicRouter`]. The topic is the NOTIFY channel name.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deadpool_postgres::Pool;
use futures_util::{stream, StreamExt};
use shelf_core::{BusError, BusResult};
use tokio::task::JoinHandle;
use tokio_postgres::{AsyncMessage, Client, NoTls};
use tracing::{debug, error, info, warn};

use crate::router::{TopicRouter, DEFAULT_QUEUE_CAPACITY};
use crate::{validate_topic, MessageHandler, NotificationBus, Subscription};

/// Quote a channel name as a PostgreSQL identifier.
fn quote_channel(topic: &str) -> String {
    format!("\"{}\"", topic.replace('"', "\"\""))
}

/// Notification bus backed by PostgreSQL `LISTEN`/`NOTIFY`.
pub struct PgNotifyBus {
    pool: Pool,
    listener: Client,
    router: Arc<TopicRouter>,
    driver: Mutex<Option<JoinHandle<()>>>,
    // Serializes LISTEN/UNLISTEN with router bookkeeping.
    membership: tokio::sync::Mutex<()>,
}

impl PgNotifyBus {
    /// Connect the listener and start driving it.
    pub async fn connect(pool: Pool, config: &tokio_postgres::Config) -> BusResult<Self> {
        Self::connect_with_queue_capacity(pool, config, DEFAULT_QUEUE_CAPACITY).await
    }

    pub async fn connect_with_queue_capacity(
        pool: Pool,
        config: &tokio_postgres::Config,
        queue_capacity: usize,
    ) -> BusResult<Self> {
        let (listener, mut connection) =
            config
                .connect(NoTls)
                .await
                .map_err(|e| BusError::Unavailable {
                    reason: format!("listener connection failed: {}", e),
                })?;

        let router = Arc::new(TopicRouter::new(queue_capacity));
        let dispatch_router = router.clone();

        let driver = tokio::spawn(async move {
            let messages = stream::poll_fn(move |cx| connection.poll_message(cx));
            futures_util::pin_mut!(messages);

            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(notification)) => {
                        dispatch_router.dispatch(notification.channel(), notification.payload());
                    }
                    Ok(AsyncMessage::Notice(notice)) => {
                        debug!(notice = %notice, "Listener notice");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Listener connection failed");
                        break;
                    }
                }
            }
            warn!("Listener connection closed, no further notifications will arrive");
        });

        info!("PostgreSQL notification listener connected");
        Ok(Self {
            pool,
            listener,
            router,
            driver: Mutex::new(Some(driver)),
            membership: tokio::sync::Mutex::new(()),
        })
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.router.subscriber_count(topic)
    }
}

#[async_trait]
impl NotificationBus for PgNotifyBus {
    async fn publish(&self, topic: &str, payload: &str) -> BusResult<()> {
        self.router.ensure_open()?;
        validate_topic(topic)?;

        let conn = self.pool.get().await.map_err(|e| BusError::Unavailable {
            reason: e.to_string(),
        })?;
        conn.execute("SELECT pg_notify($1, $2)", &[&topic, &payload])
            .await
            .map_err(|e| BusError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        debug!(topic, "Published notification");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> BusResult<Subscription> {
        self.router.ensure_open()?;
        validate_topic(topic).map_err(|e| BusError::SubscribeFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        let _guard = self.membership.lock().await;
        if self.router.subscriber_count(topic) == 0 {
            self.listener
                .batch_execute(&format!("LISTEN {}", quote_channel(topic)))
                .await
                .map_err(|e| BusError::SubscribeFailed {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
            debug!(topic, "Listening");
        }
        self.router.register(topic, handler)
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> BusResult<()> {
        let _guard = self.membership.lock().await;
        if self.router.remove(subscription) && !self.router.is_closed() {
            // Best effort: a stale LISTEN only costs dropped notifications.
            if let Err(e) = self
                .listener
                .batch_execute(&format!("UNLISTEN {}", quote_channel(subscription.topic())))
                .await
            {
                warn!(topic = subscription.topic(), error = %e, "UNLISTEN failed");
            }
        }
        Ok(())
    }

    async fn close(&self) -> BusResult<()> {
        let _guard = self.membership.lock().await;
        if self.router.is_closed() {
            return Ok(());
        }
        self.router.close();
        if let Err(e) = self.listener.batch_execute("UNLISTEN *").await {
            debug!(error = %e, "UNLISTEN * failed during close");
        }
        let driver = match self.driver.lock() {
            Ok(mut driver) => driver.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(driver) = driver {
            driver.abort();
        }
        info!("PostgreSQL notification bus closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_channel() {
        assert_eq!(quote_channel("product_changes"), "\"product_changes\"");
        assert_eq!(quote_channel("Mixed Case"), "\"Mixed Case\"");
        assert_eq!(quote_channel("a\"b"), "\"a\"\"b\"");
    }

    #[cfg(feature = "db-tests")]
    mod db {
        use super::*;
        use crate::BusMessage;
        use shelf_storage::DbConfig;
        use std::time::Duration;
        use tokio::sync::mpsc;

        async fn connect_bus() -> PgNotifyBus {
            let config = DbConfig::from_env();
            let pool = config.create_pool().expect("pool creation should succeed");
            PgNotifyBus::connect(pool, &config.pg_config())
                .await
                .expect("listener should connect")
        }

        #[tokio::test]
        async fn test_notify_round_trip_through_postgres() {
            let bus = connect_bus().await;
            let (tx, mut rx) = mpsc::unbounded_channel::<BusMessage>();
            let handler: MessageHandler = Arc::new(move |message| {
                let _ = tx.send(message);
            });

            let sub = bus
                .subscribe("shelf_db_test", handler)
                .await
                .expect("subscribe should succeed");
            bus.publish("shelf_db_test", "first")
                .await
                .expect("publish should succeed");
            bus.publish("shelf_db_test", "second")
                .await
                .expect("publish should succeed");

            for expected in ["first", "second"] {
                let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                    .await
                    .expect("notification should arrive")
                    .expect("channel should be open");
                assert_eq!(message.payload, expected);
            }

            bus.unsubscribe(&sub).await.expect("unsubscribe should succeed");
            bus.close().await.expect("close should succeed");
            assert_eq!(
                bus.publish("shelf_db_test", "x").await,
                Err(BusError::Closed)
            );
        }

        #[tokio::test]
        async fn test_overlong_topic_is_rejected_before_postgres() {
            let bus = connect_bus().await;
            let topic = "t".repeat(64);
            assert!(matches!(
                bus.publish(&topic, "x").await,
                Err(BusError::InvalidTopic { .. })
            ));
        }
    }
}
