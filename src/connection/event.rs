use std::fmt;

/// Outcome carried by a connect acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReason {
    Success,
    /// The socket could not be opened or was closed mid-handshake.
    ServerUnavailable,
    /// The broker refused the credentials.
    NotAuthorized,
    /// The broker answered with something the handshake did not expect, or
    /// did not answer in time.
    ProtocolError,
}

impl ConnectReason {
    pub fn is_success(self) -> bool {
        matches!(self, ConnectReason::Success)
    }

    /// Numeric code, following MQTT CONNACK return codes.
    pub fn code(self) -> u8 {
        match self {
            ConnectReason::Success => 0,
            ConnectReason::ProtocolError => 1,
            ConnectReason::ServerUnavailable => 3,
            ConnectReason::NotAuthorized => 5,
        }
    }
}

impl fmt::Display for ConnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectReason::Success => "success",
            ConnectReason::ServerUnavailable => "server unavailable",
            ConnectReason::NotAuthorized => "not authorized",
            ConnectReason::ProtocolError => "protocol error",
        };
        write!(f, "{text} (code {})", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect` was called.
    Requested,
    ClosedByBroker,
    Transport(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "requested"),
            DisconnectReason::ClosedByBroker => write!(f, "closed by broker"),
            DisconnectReason::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// Lifecycle notifications emitted by the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session task started its handshake.
    Connecting,
    Connect {
        reason: ConnectReason,
        detail: Option<String>,
    },
    Disconnect {
        reason: DisconnectReason,
    },
    PublishAck {
        message_id: String,
    },
}
