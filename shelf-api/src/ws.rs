//! WebSocket Session Transport
//!
//! Carries gateway sessions over WebSocket connections. Every relayed
//! message is sent as a JSON text frame `{"event": ..., "payload": ...}`.
//!
//! ## Protocol
//!
//! 1. Client connects to `GET /ws`
//! 2. Server sends `connected` with the session id
//! 3. Server streams every relayed message (`entity_changed` and custom topics)
//! 4. Client may send `{"action": "subscribe", "channel": "<topic>"}` to have
//!    the gateway relay a custom topic, or `"unsubscribe"` to leave it
//! 5. On disconnect the session leaves the fan-out list

use crate::gateway::{FanoutGateway, RelayedMessage, SessionHandle};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Actions a client can request over the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAction {
    Subscribe,
    Unsubscribe,
}

/// A client frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCommand {
    pub action: ClientAction,
    pub channel: String,
}

/// WebSocket upgrade handler.
///
/// ## Example
///
/// ```text
/// GET /ws
/// Upgrade: websocket
/// ```
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(gateway): State<Arc<FanoutGateway>>,
) -> Response {
    debug!("WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, gateway))
}

/// Handle an individual WebSocket connection.
///
/// Runs for the lifetime of the connection, forwarding relayed messages and
/// applying client commands.
async fn handle_socket(socket: WebSocket, gateway: Arc<FanoutGateway>) {
    let mut session = gateway.connect();
    let session_id = session.id();
    info!(session_id = %session_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let connected = RelayedMessage::new("connected", json!({ "sessionId": session_id }));
    if let Err(e) = send_message(&mut sender, &connected).await {
        error!(session_id = %session_id, error = %e, "Failed to send connected event");
        return;
    }

    loop {
        tokio::select! {
            // Relayed message for this session
            result = session.recv() => {
                match result {
                    Ok(message) => {
                        if let Err(e) = send_message(&mut sender, &message).await {
                            error!(
                                session_id = %session_id,
                                error = %e,
                                "Failed to send message, closing connection"
                            );
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            session_id = %session_id,
                            skipped = skipped,
                            "Session lagged, some messages were dropped"
                        );
                        let lagged = RelayedMessage::new(
                            "error",
                            json!(format!("Lagged: {} messages dropped", skipped)),
                        );
                        if let Err(e) = send_message(&mut sender, &lagged).await {
                            error!(session_id = %session_id, error = %e, "Failed to send error event");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(session_id = %session_id, "Fan-out list closed");
                        break;
                    }
                }
            }

            // Frame from the client
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let reply = apply_command(&gateway, &mut session, &text).await;
                        if let Err(e) = send_message(&mut sender, &reply).await {
                            error!(session_id = %session_id, error = %e, "Failed to send reply");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session_id = %session_id, "Client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Pong is automatically sent by axum
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(
                            session_id = %session_id,
                            len = data.len(),
                            "Received binary message (ignored)"
                        );
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    session.disconnect();
    info!(session_id = %session_id, "WebSocket disconnected");
}

/// Apply a client command and build the reply frame.
async fn apply_command(
    gateway: &FanoutGateway,
    session: &mut SessionHandle,
    text: &str,
) -> RelayedMessage {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            debug!(session_id = %session.id(), error = %e, "Unrecognized client frame");
            return RelayedMessage::new("error", json!(format!("Invalid command: {}", e)));
        }
    };

    let channel = command.channel.trim();
    if channel.is_empty() {
        return RelayedMessage::new("error", json!("Required field 'channel' is missing"));
    }

    match command.action {
        ClientAction::Subscribe => {
            if let Err(e) = shelf_bus::validate_topic(channel) {
                return RelayedMessage::new("error", json!(e.to_string()));
            }
            if let Err(e) = gateway.relay_topic(channel).await {
                warn!(session_id = %session.id(), channel, error = %e, "Relay registration failed");
                return RelayedMessage::new("error", json!(format!("Subscribe failed: {}", e)));
            }
            session.join(channel);
            debug!(session_id = %session.id(), channel, "Session joined channel");
            RelayedMessage::new("subscribed", json!({ "channel": channel }))
        }
        ClientAction::Unsubscribe => {
            session.leave(channel);
            debug!(session_id = %session.id(), channel, "Session left channel");
            RelayedMessage::new("unsubscribed", json!({ "channel": channel }))
        }
    }
}

/// Send a message to the WebSocket client.
///
/// Serializes the message to JSON and sends it as a text frame.
async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &RelayedMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(|e| {
        error!(error = %e, "Failed to serialize message");
        axum::Error::new(e)
    })?;

    sender.send(Message::Text(json)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_bus::InMemoryBus;

    #[test]
    fn test_client_command_parsing() {
        let command: ClientCommand =
            serde_json::from_str(r#"{"action":"subscribe","channel":"alerts"}"#)
                .expect("command should parse");
        assert_eq!(command.action, ClientAction::Subscribe);
        assert_eq!(command.channel, "alerts");

        assert!(serde_json::from_str::<ClientCommand>(r#"{"action":"shout","channel":"x"}"#).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_command_registers_relay() {
        let bus = Arc::new(InMemoryBus::new());
        let gateway = FanoutGateway::new(bus.clone(), 16);
        let mut session = gateway.connect();

        let reply = apply_command(
            &gateway,
            &mut session,
            r#"{"action":"subscribe","channel":"alerts"}"#,
        )
        .await;
        assert_eq!(reply.event, "subscribed");
        assert!(session.topics().contains("alerts"));
        assert_eq!(bus.subscriber_count("alerts"), 1);

        let reply = apply_command(
            &gateway,
            &mut session,
            r#"{"action":"unsubscribe","channel":"alerts"}"#,
        )
        .await;
        assert_eq!(reply.event, "unsubscribed");
        assert!(session.topics().is_empty());
    }

    #[tokio::test]
    async fn test_bad_commands_get_error_replies() {
        let bus = Arc::new(InMemoryBus::new());
        let gateway = FanoutGateway::new(bus, 16);
        let mut session = gateway.connect();

        for frame in [
            "not json",
            r#"{"action":"subscribe","channel":"  "}"#,
            &format!(r#"{{"action":"subscribe","channel":"{}"}}"#, "x".repeat(64)),
        ] {
            let reply = apply_command(&gateway, &mut session, frame).await;
            assert_eq!(reply.event, "error", "frame {:?} should be rejected", frame);
        }
        assert!(session.topics().is_empty());
    }
}
