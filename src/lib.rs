//! # Telemetry Transmitter
//!
//! `telemetry_transmitter` forwards sensor readings from a local producer to
//! a remote pub/sub broker over an unreliable link. Delivery is
//! at-least-once: readings that cannot be sent are held in a bounded
//! in-memory queue and replayed, oldest first, when the session comes back.
//!
//! ## Core Modules
//!
//! - `reading`: the immutable record supplied by the producer, its topic and payload.
//! - `queue`: the bounded drop-oldest offline buffer.
//! - `connection`: broker session supervision and connection state.
//! - `transport`: the WebSocket wire protocol and the session task.
//! - `publisher`: the send-or-buffer decision for each reading.
//! - `replay`: draining the offline buffer after a reconnect.
//! - `status`: read-only health snapshots.
//! - `transmitter`: the facade wiring everything together.
//! - `ingest`: JSON-lines reading input for the binary.
//! - `config`: settings loading.
//! - `utils`: errors and logging setup.

pub mod config;
pub mod connection;
pub mod ingest;
pub mod publisher;
pub mod queue;
pub mod reading;
pub mod replay;
pub mod status;
pub mod transmitter;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use reading::{Position, Reading};
pub use status::TransmitterStatus;
pub use transmitter::Transmitter;
