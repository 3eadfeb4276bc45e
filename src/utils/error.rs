//! Error types used inside the transmitter.
//!
//! None of these escape the producer-facing calls (`transmit_one`,
//! `transmit_batch`, `connect`), which degrade to `bool`/counts instead.
//! They exist so the internals can use `?` and so failures are logged with
//! a meaningful cause.

use thiserror::Error;

/// Failure to hand a publish over to the live session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("session is not connected")]
    NotConnected,

    #[error("session outbound channel is closed")]
    ChannelClosed,

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure while establishing or running the broker session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("websocket connection failed: {0}")]
    Connect(#[from] tungstenite::Error),

    #[error("broker rejected the session: {0}")]
    Rejected(String),

    #[error("unexpected frame from broker: {0}")]
    UnexpectedFrame(String),

    #[error("broker closed the connection during the handshake")]
    ClosedDuringHandshake,

    #[error("handshake did not complete in time")]
    HandshakeTimeout,

    #[error("failed to encode client message: {0}")]
    Encode(#[from] serde_json::Error),
}
