//! Fan-out Gateway
//!
//! Relays bus messages to every connected session.
//!
//! ## Architecture
//!
//! - One tokio broadcast channel is the single fan-out list; each session
//!   holds a receiver on it.
//! - The gateway owns at most one bus subscription per relayed topic, no
//!   matter how many sessions asked for it.
//! - The reserved topic is relayed as `entity_changed` with the parsed
//!   change event. Custom topics are relayed under their own name with the
//!   raw message as a JSON string, to every session.
//! - Sessions never see a message the bus dispatched before they connected.
//!   Each relayed message keeps the bus sequence stamp, and a session drops
//!   anything stamped before its own connect stamp, even if the relay task
//!   fans it out afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use shelf_bus::{next_sequence, BusMessage, MessageHandler, NotificationBus, Subscription};
use shelf_core::{BusResult, ChangeEvent, ENTITY_CHANGED_EVENT, PRODUCT_CHANGES_TOPIC};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier of a connected session.
pub type SessionId = Uuid;

/// A message as delivered to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub event: String,
    pub payload: JsonValue,
}

impl RelayedMessage {
    pub fn new(event: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// A change event relayed from the reserved topic.
    pub fn entity_changed(event: &ChangeEvent) -> Result<Self, serde_json::Error> {
        Ok(Self::new(ENTITY_CHANGED_EVENT, serde_json::to_value(event)?))
    }

    /// A raw message relayed from a custom topic.
    pub fn custom(topic: &str, message: &str) -> Self {
        Self::new(topic, JsonValue::String(message.to_string()))
    }
}

/// What travels on the fan-out list.
#[derive(Debug, Clone)]
struct Stamped {
    sequence: u64,
    message: RelayedMessage,
}

/// Send a message to every live session. Never blocks.
fn fan_out(tx: &broadcast::Sender<Stamped>, sequence: u64, message: RelayedMessage) {
    let event = message.event.clone();
    match tx.send(Stamped { sequence, message }) {
        Ok(receivers) => {
            debug!(event = %event, receivers, "Relayed message");
        }
        Err(_) => {
            // No sessions connected - this is fine
            debug!(event = %event, "No sessions for relayed message");
        }
    }
}

fn change_relay(tx: broadcast::Sender<Stamped>) -> MessageHandler {
    Arc::new(move |message: BusMessage| {
        let relayed = serde_json::from_str::<ChangeEvent>(&message.payload)
            .and_then(|event| RelayedMessage::entity_changed(&event));
        match relayed {
            Ok(relayed) => fan_out(&tx, message.sequence, relayed),
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Dropping malformed change event");
            }
        }
    })
}

fn custom_relay(tx: broadcast::Sender<Stamped>) -> MessageHandler {
    Arc::new(move |message: BusMessage| {
        let relayed = RelayedMessage::custom(&message.topic, &message.payload);
        fan_out(&tx, message.sequence, relayed);
    })
}

/// Relays bus topics to connected sessions.
pub struct FanoutGateway {
    bus: Arc<dyn NotificationBus>,
    tx: broadcast::Sender<Stamped>,
    relays: Mutex<HashMap<String, Subscription>>,
}

impl FanoutGateway {
    /// Create a gateway whose sessions buffer up to `capacity` messages
    /// before they start lagging.
    pub fn new(bus: Arc<dyn NotificationBus>, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            bus,
            tx,
            relays: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to the reserved topic. Idempotent.
    pub async fn start(&self) -> BusResult<()> {
        let mut relays = self.relays.lock().await;
        if relays.contains_key(PRODUCT_CHANGES_TOPIC) {
            return Ok(());
        }
        let subscription = self
            .bus
            .subscribe(PRODUCT_CHANGES_TOPIC, change_relay(self.tx.clone()))
            .await?;
        relays.insert(PRODUCT_CHANGES_TOPIC.to_string(), subscription);
        info!(topic = PRODUCT_CHANGES_TOPIC, "Gateway relaying change events");
        Ok(())
    }

    /// Make sure `topic` is relayed to sessions.
    ///
    /// The first call for a topic subscribes on the bus; later calls are
    /// no-ops. The reserved topic is only relayed through [`Self::start`].
    pub async fn relay_topic(&self, topic: &str) -> BusResult<()> {
        if topic == PRODUCT_CHANGES_TOPIC {
            return Ok(());
        }
        let mut relays = self.relays.lock().await;
        if relays.contains_key(topic) {
            return Ok(());
        }
        let subscription = self
            .bus
            .subscribe(topic, custom_relay(self.tx.clone()))
            .await?;
        relays.insert(topic.to_string(), subscription);
        info!(topic, "Gateway relaying custom topic");
        Ok(())
    }

    /// Topics currently relayed, reserved topic included.
    pub async fn relayed_topics(&self) -> Vec<String> {
        self.relays.lock().await.keys().cloned().collect()
    }

    /// Register a new session on the fan-out list.
    ///
    /// The session sees every message dispatched by the bus after this call
    /// and none dispatched before it.
    pub fn connect(&self) -> SessionHandle {
        // Join the list before taking the stamp so nothing falls in between.
        let receiver = self.tx.subscribe();
        let session = SessionHandle {
            id: Uuid::now_v7(),
            receiver,
            connected_at: next_sequence(),
            topics: HashSet::new(),
        };
        debug!(session_id = %session.id, sessions = self.session_count(), "Session connected");
        session
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Drop every relay subscription.
    pub async fn shutdown(&self) {
        let mut relays = self.relays.lock().await;
        for (topic, subscription) in relays.drain() {
            if let Err(e) = self.bus.unsubscribe(&subscription).await {
                warn!(topic = %topic, error = %e, "Failed to drop relay subscription");
            }
        }
        info!("Gateway stopped relaying");
    }
}

/// A connected session. Dropping it removes the session from the fan-out list.
pub struct SessionHandle {
    id: SessionId,
    receiver: broadcast::Receiver<Stamped>,
    connected_at: u64,
    topics: HashSet<String>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Wait for the next relayed message.
    pub async fn recv(&mut self) -> Result<RelayedMessage, broadcast::error::RecvError> {
        loop {
            let stamped = self.receiver.recv().await?;
            if stamped.sequence > self.connected_at {
                return Ok(stamped.message);
            }
        }
    }

    /// Take a relayed message if one is already queued.
    pub fn try_recv(&mut self) -> Result<RelayedMessage, broadcast::error::TryRecvError> {
        loop {
            let stamped = self.receiver.try_recv()?;
            if stamped.sequence > self.connected_at {
                return Ok(stamped.message);
            }
        }
    }

    /// Record that this session joined `topic`. Returns `false` if it already had.
    pub fn join(&mut self, topic: &str) -> bool {
        self.topics.insert(topic.to_string())
    }

    /// Record that this session left `topic`. Returns `false` if it had not joined.
    pub fn leave(&mut self, topic: &str) -> bool {
        self.topics.remove(topic)
    }

    pub fn topics(&self) -> &HashSet<String> {
        &self.topics
    }

    /// Leave the fan-out list.
    pub fn disconnect(self) {
        debug!(session_id = %self.id, "Session disconnected");
    }
}
