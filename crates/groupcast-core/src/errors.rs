//! Hub error taxonomy.

use crate::ids::ConnectionId;

/// Delivery and membership errors reported by the [`Hub`](crate::Hub).
///
/// Neither variant is fatal: a broadcast records them per member and moves on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The target is not registered, or is already closing.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The target's send queue is saturated.
    #[error("send queue full for connection {0}")]
    QueueFull(ConnectionId),
}

impl HubError {
    /// The connection the error refers to.
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            Self::UnknownConnection(id) | Self::QueueFull(id) => id,
        }
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::UnknownConnection(_) => "unknown_connection",
            Self::QueueFull(_) => "queue_full",
        }
    }
}
