//! # groupcast-core
//!
//! In-process group broadcast hub for WebSocket-style connections.
//!
//! - [`Connection`]: one client session with a bounded outbound queue and a
//!   `Connecting → Open → Closing → Closed` lifecycle
//! - [`GroupRegistry`]: group name → member ids, with a reverse index
//! - [`Hub`]: connection directory + registry behind a single mutex, with
//!   snapshot-then-fan-out broadcasting
//!
//! Nothing in this crate performs network I/O; transports drain the queues.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod hub;
pub mod ids;
pub mod registry;

pub use connection::{Connection, ConnectionState, Payload};
pub use errors::HubError;
pub use hub::{BroadcastReport, Hub, DEFAULT_QUEUE_CAPACITY};
pub use ids::ConnectionId;
pub use registry::GroupRegistry;
