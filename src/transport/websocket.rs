//! WebSocket session
//!
//! `run_session` owns one connection to the broker for its whole life:
//! - open the WebSocket, tagging the request with the client id
//! - log in and authenticate when credentials are configured
//! - forward outbound frames queued by the connection manager
//! - ping the broker while idle and surface publish acknowledgments
//!
//! It reports what happens through `SessionEvent`s and returns once the
//! session is over, whether by request, by the broker or by a socket error.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval_at, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::protocol::Message as WsMessage;

use crate::connection::event::{ConnectReason, DisconnectReason, SessionEvent};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::SessionError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Header carrying the device/client identifier on the upgrade request.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Everything the session task needs to reach and authenticate with the
/// broker.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub url: String,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    /// Bound on the whole handshake: socket, login and auth together.
    pub handshake_timeout: Duration,
}

/// Run one broker session until it ends.
///
/// Always emits `SessionEvent::Connecting` first. Then one of:
/// - `Connect` with a failure reason, and nothing else
/// - `Connect` with `Success`, later followed by a single `Disconnect`
/// - `Disconnect { reason: Requested }` alone, when shutdown is requested
///   before the handshake completes
///
/// On requested shutdown, frames already queued on `outbound` are written
/// before the close frame.
pub async fn run_session(
    params: SessionParams,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = events.send(SessionEvent::Connecting);

    let handshake = tokio::select! {
        result = timeout(params.handshake_timeout, establish(&params)) => {
            Some(result.unwrap_or(Err(SessionError::HandshakeTimeout)))
        }
        _ = shutdown_requested(&mut shutdown) => None,
    };

    let (mut sink, mut source) = match handshake {
        Some(Ok(halves)) => halves,
        Some(Err(e)) => {
            let reason = connect_reason(&e);
            warn!("Failed to connect to broker at {}: {}", params.url, e);
            let _ = events.send(SessionEvent::Connect {
                reason,
                detail: Some(e.to_string()),
            });
            return;
        }
        None => {
            info!("Shutdown requested during handshake with {}", params.url);
            let _ = events.send(SessionEvent::Disconnect {
                reason: DisconnectReason::Requested,
            });
            return;
        }
    };

    info!("Session established with {}", params.url);
    let _ = events.send(SessionEvent::Connect {
        reason: ConnectReason::Success,
        detail: None,
    });

    let mut keep_alive = interval_at(
        tokio::time::Instant::now() + params.keep_alive,
        params.keep_alive,
    );
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => {
                match flush_outbound(&mut outbound, &mut sink).await {
                    Ok(flushed) => {
                        if flushed > 0 {
                            debug!("Flushed {flushed} queued frames before closing");
                        }
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break DisconnectReason::Requested;
                    }
                    Err(e) => {
                        warn!("Failed to flush queued frames: {e}");
                        break DisconnectReason::Transport(e.to_string());
                    }
                }
            }
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            warn!("Failed to write to broker: {e}");
                            break DisconnectReason::Transport(e.to_string());
                        }
                    }
                    None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break DisconnectReason::Requested;
                    }
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => handle_server_frame(text.as_str(), &events),
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!("Broker sent close frame: {frame:?}");
                        break DisconnectReason::ClosedByBroker;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Broker connection error: {e}");
                        break DisconnectReason::Transport(e.to_string());
                    }
                    None => break DisconnectReason::ClosedByBroker,
                }
            }
            _ = keep_alive.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    warn!("Keep-alive ping failed: {e}");
                    break DisconnectReason::Transport(e.to_string());
                }
            }
        }
    };

    info!("Session with {} ended: {reason}", params.url);
    let _ = events.send(SessionEvent::Disconnect { reason });
}

/// Resolves once shutdown is signalled or the manager side is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Stop accepting frames and write out whatever is still queued.
async fn flush_outbound(
    outbound: &mut mpsc::UnboundedReceiver<WsMessage>,
    sink: &mut WsSink,
) -> Result<usize, tungstenite::Error> {
    outbound.close();
    let mut flushed = 0;
    while let Some(frame) = outbound.recv().await {
        sink.send(frame).await?;
        flushed += 1;
    }
    Ok(flushed)
}

fn connect_reason(error: &SessionError) -> ConnectReason {
    match error {
        SessionError::Connect(_) | SessionError::ClosedDuringHandshake => {
            ConnectReason::ServerUnavailable
        }
        SessionError::Rejected(_) => ConnectReason::NotAuthorized,
        SessionError::UnexpectedFrame(_)
        | SessionError::HandshakeTimeout
        | SessionError::Encode(_) => ConnectReason::ProtocolError,
    }
}

/// Open the socket and complete the login/auth exchange if needed.
async fn establish(params: &SessionParams) -> Result<(WsSink, WsSource), SessionError> {
    let mut request = params.url.as_str().into_client_request()?;
    if let Ok(value) = HeaderValue::from_str(&params.client_id) {
        request.headers_mut().insert(CLIENT_ID_HEADER, value);
    }

    let (ws_stream, _response) = connect_async(request).await?;
    let (mut sink, mut source) = ws_stream.split();

    if let Some((username, password)) = &params.credentials {
        let login = ClientMessage::Login {
            username: username.clone(),
            password: password.clone(),
        };
        send_json(&mut sink, &login).await?;

        let token = match expect_reply(&mut source).await? {
            ServerMessage::LoginResponse { token } => token,
            ServerMessage::Error { message } => return Err(SessionError::Rejected(message)),
            other => return Err(SessionError::UnexpectedFrame(format!("{other:?}"))),
        };

        send_json(&mut sink, &ClientMessage::Auth { token }).await?;

        match expect_reply(&mut source).await? {
            ServerMessage::Authenticated {} => {
                debug!("Authenticated as {username}");
            }
            ServerMessage::Error { message } => return Err(SessionError::Rejected(message)),
            other => return Err(SessionError::UnexpectedFrame(format!("{other:?}"))),
        }
    }

    Ok((sink, source))
}

async fn send_json(sink: &mut WsSink, message: &ClientMessage) -> Result<(), SessionError> {
    let text = serde_json::to_string(message)?;
    sink.send(WsMessage::text(text)).await?;
    Ok(())
}

/// Wait for the next protocol frame, skipping control frames.
async fn expect_reply(source: &mut WsSource) -> Result<ServerMessage, SessionError> {
    loop {
        match source.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return serde_json::from_str::<ServerMessage>(text.as_str()).map_err(|e| {
                    SessionError::UnexpectedFrame(format!(
                        "{e} | {}",
                        text.as_str().chars().take(100).collect::<String>()
                    ))
                });
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                return Err(SessionError::ClosedDuringHandshake);
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(SessionError::Connect(e)),
        }
    }
}

fn handle_server_frame(text: &str, events: &mpsc::UnboundedSender<SessionEvent>) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::PublishAck { message_id }) => {
            let _ = events.send(SessionEvent::PublishAck { message_id });
        }
        Ok(ServerMessage::Error { message }) => {
            warn!("Broker reported an error: {message}");
        }
        Ok(ServerMessage::Message { topic, .. }) => {
            trace!("Ignoring delivery on {topic}");
        }
        Ok(other) => {
            debug!("Ignoring unexpected frame after handshake: {other:?}");
        }
        Err(err) => {
            warn!(
                "Invalid broker frame: {err} | {}",
                text.chars().take(100).collect::<String>()
            );
        }
    }
}
