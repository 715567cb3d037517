//! Typed inbound frames and session end reasons.

use std::fmt;

use axum::extract::ws::Message;
use bytes::Bytes;

/// A decoded inbound `WebSocket` frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame, possibly UTF-8.
    Binary(Bytes),
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
    /// Close frame with the peer's close code, if it sent one.
    Close(Option<u16>),
}

impl InboundFrame {
    /// Text carried by the frame: text frames, and binary frames that decode
    /// as UTF-8 (some clients only send binary).
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(data) => std::str::from_utf8(data).ok(),
            Self::Ping | Self::Pong | Self::Close(_) => None,
        }
    }
}

impl From<Message> for InboundFrame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(data) => Self::Binary(data),
            Message::Ping(_) => Self::Ping,
            Message::Pong(_) => Self::Pong,
            Message::Close(frame) => Self::Close(frame.map(|f| f.code)),
        }
    }
}

/// Why a session's read loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent a close frame.
    ClientClosed {
        /// Close code from the frame, if any.
        code: Option<u16>,
    },
    /// Reading from the socket failed.
    ReadError(String),
    /// Writing to the socket failed.
    WriteError,
    /// Nothing was heard from the peer within the heartbeat timeout.
    HeartbeatTimeout,
    /// The server asked the connection to close.
    ServerShutdown,
    /// The inbound stream ended without a close frame.
    StreamEnded,
}

impl DisconnectReason {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientClosed { .. } => "client_closed",
            Self::ReadError(_) => "read_error",
            Self::WriteError => "write_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::ServerShutdown => "server_shutdown",
            Self::StreamEnded => "stream_ended",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed { code: Some(code) } => write!(f, "client closed ({code})"),
            Self::ClientClosed { code: None } => f.write_str("client closed"),
            Self::ReadError(err) => write!(f, "read error: {err}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{close_code, CloseFrame, Utf8Bytes};

    #[test]
    fn text_frame_decodes() {
        let frame = InboundFrame::from(Message::text("hi"));
        assert_eq!(frame, InboundFrame::Text("hi".into()));
        assert_eq!(frame.text(), Some("hi"));
    }

    #[test]
    fn utf8_binary_counts_as_text() {
        let frame = InboundFrame::from(Message::Binary(Bytes::from_static(b"bin")));
        assert_eq!(frame.text(), Some("bin"));
    }

    #[test]
    fn non_utf8_binary_has_no_text() {
        let frame = InboundFrame::from(Message::Binary(Bytes::from_static(&[0xff, 0xfe])));
        assert!(matches!(frame, InboundFrame::Binary(_)));
        assert_eq!(frame.text(), None);
    }

    #[test]
    fn control_frames_have_no_text() {
        assert_eq!(InboundFrame::from(Message::Ping(Bytes::new())), InboundFrame::Ping);
        assert_eq!(InboundFrame::from(Message::Pong(Bytes::new())), InboundFrame::Pong);
        assert_eq!(InboundFrame::Ping.text(), None);
    }

    #[test]
    fn close_frame_keeps_code() {
        let msg = Message::Close(Some(CloseFrame {
            code: close_code::AWAY,
            reason: Utf8Bytes::from_static("bye"),
        }));
        assert_eq!(InboundFrame::from(msg), InboundFrame::Close(Some(close_code::AWAY)));
        assert_eq!(InboundFrame::from(Message::Close(None)), InboundFrame::Close(None));
    }

    #[test]
    fn reason_labels() {
        assert_eq!(DisconnectReason::HeartbeatTimeout.as_str(), "heartbeat_timeout");
        assert_eq!(
            DisconnectReason::ClientClosed { code: Some(1000) }.to_string(),
            "client closed (1000)"
        );
        assert_eq!(
            DisconnectReason::ReadError("reset".into()).to_string(),
            "read error: reset"
        );
        assert_eq!(DisconnectReason::StreamEnded.to_string(), "stream_ended");
    }
}
