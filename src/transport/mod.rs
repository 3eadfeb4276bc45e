//! The `transport` module speaks the broker's WebSocket protocol.
//!
//! It defines the JSON frames exchanged with the broker and runs the session
//! task: handshake (login/auth when credentials are configured), outbound
//! publishes, keep-alive pings and inbound acknowledgments. Every lifecycle
//! change is reported as a `SessionEvent` on a channel; the task never
//! touches shared state directly.

pub mod message;
pub mod websocket;

pub use message::{ClientMessage, QOS_AT_LEAST_ONCE, ServerMessage};
pub use websocket::{SessionParams, run_session};
