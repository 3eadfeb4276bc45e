//! The `connection` module supervises the broker session.
//!
//! `ConnectionManager` starts and stops the session task, and turns the
//! typed `SessionEvent`s that task emits into the shared `ConnectionState`
//! read by the publisher. The `Session` trait is the narrow send-side view
//! the publisher and replay pass depend on.

pub mod event;
pub mod manager;
pub mod session;
pub mod state;

pub use event::{ConnectReason, DisconnectReason, SessionEvent};
pub use manager::ConnectionManager;
pub use session::Session;
pub use state::{ConnectionState, SharedState};
