//! Application callbacks invoked by a session.

use groupcast_core::{ConnectionId, Hub, HubError};

use super::frame::DisconnectReason;

/// Per-connection application logic.
///
/// Callbacks run on the session task and must not block. Errors are logged
/// by the session and never end it.
pub trait SessionHandler: Send + Sync + 'static {
    /// The connection is open and registered with the hub.
    fn on_connect(&self, hub: &Hub, conn: &ConnectionId) -> Result<(), HubError>;

    /// A text (or UTF-8 binary) frame arrived.
    fn on_message(&self, hub: &Hub, conn: &ConnectionId, text: &str) -> Result<(), HubError>;

    /// The read loop ended and the writer has finished.
    fn on_disconnect(&self, hub: &Hub, conn: &ConnectionId, reason: &DisconnectReason);
}
