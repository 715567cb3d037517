//! # groupcast-server
//!
//! Axum HTTP + `WebSocket` front end for the groupcast [`Hub`].
//!
//! - `GET /ws`: one session per socket, driven by a [`SessionHandler`]
//! - `POST /add`: broadcast `{"added": data}` to the configured group
//! - `GET /health`, `GET /`
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`
//!
//! [`Hub`]: groupcast_core::Hub

#![deny(unsafe_code)]

pub mod echo;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod trigger;
pub mod websocket;

pub use echo::{EchoHandler, OutboundMessage};
pub use server::{AppState, GroupcastServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::{DisconnectReason, InboundFrame, SessionHandler, SessionOptions};
