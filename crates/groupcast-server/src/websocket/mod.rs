//! WebSocket sessions: frame decoding, heartbeat, and the reader/writer pair.

pub mod frame;
pub mod handler;
pub mod heartbeat;
pub mod session;

pub use frame::{DisconnectReason, InboundFrame};
pub use handler::SessionHandler;
pub use session::{drive_session, run_session, SessionOptions};
