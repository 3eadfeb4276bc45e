use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(text)
    }
}

/// Connection state shared between the producer side (reads) and the event
/// pump (writes). Readers may briefly observe a stale value.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ConnectionState::Disconnected.as_u8())))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store `state`, returning the previous value.
    pub fn set(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(state.as_u8(), Ordering::AcqRel))
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
