use crate::connection::state::ConnectionState;
use crate::utils::error::TransportError;

/// The send side of a broker session, as seen by the publisher and the
/// replay pass.
///
/// `publish` must not block on network I/O: it hands the message to the
/// session and returns. `Ok` means the transport accepted the message, not
/// that the broker acknowledged it.
pub trait Session: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Queue `payload` for delivery on `topic` and return its message id.
    fn publish(&self, topic: String, payload: String) -> Result<String, TransportError>;
}
