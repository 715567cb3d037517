//! Echo application: greet on connect, echo text back, broadcast triggers.

use groupcast_core::{ConnectionId, Hub, HubError, Payload};
use groupcast_settings::AppSettings;
use serde_json::{json, Value};
use tracing::debug;

use crate::websocket::{DisconnectReason, SessionHandler};

/// Frames the server sends to clients.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    /// `{"message": "..."}`: greetings and echoes.
    Message(String),
    /// `{"added": <data>}`: values broadcast by the trigger endpoint.
    Added(Value),
}

impl OutboundMessage {
    /// Wire representation.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Message(message) => json!({ "message": message }),
            Self::Added(added) => json!({ "added": added }),
        }
    }

    /// Serialize once into a shareable payload.
    pub fn encode(&self) -> Payload {
        Payload::from(self.to_value().to_string())
    }
}

/// Joins every connection to one group, greets it, and echoes its text.
#[derive(Clone, Debug)]
pub struct EchoHandler {
    group: String,
    greeting: String,
    echo_prefix: String,
}

impl EchoHandler {
    /// Build from the `app` settings section.
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            group: settings.group.clone(),
            greeting: settings.greeting.clone(),
            echo_prefix: settings.echo_prefix.clone(),
        }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new(&AppSettings::default())
    }
}

impl SessionHandler for EchoHandler {
    fn on_connect(&self, hub: &Hub, conn: &ConnectionId) -> Result<(), HubError> {
        hub.join(&self.group, conn)?;
        hub.send_to_connection(conn, OutboundMessage::Message(self.greeting.clone()).encode())
    }

    fn on_message(&self, hub: &Hub, conn: &ConnectionId, text: &str) -> Result<(), HubError> {
        let reply = OutboundMessage::Message(format!("{}{text}", self.echo_prefix));
        hub.send_to_connection(conn, reply.encode())
    }

    fn on_disconnect(&self, hub: &Hub, conn: &ConnectionId, reason: &DisconnectReason) {
        if hub.disconnect(conn) {
            debug!(conn_id = %conn, %reason, group = %self.group, "removed from hub");
        }
    }
}
