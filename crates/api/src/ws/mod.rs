//! WebSocket infrastructure for real-time job progress.
//!
//! Provides connection management, heartbeat monitoring, the client
//! protocol, and the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;
pub mod protocol;

pub use handler::ws_handler;
pub use heartbeat::{start_heartbeat, HEARTBEAT_INTERVAL};
pub use manager::WsManager;
