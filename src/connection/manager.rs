//! Broker session supervision
//!
//! `ConnectionManager` owns the single logical session with the broker:
//! - `connect` spawns the session task and waits (bounded) for its connect
//!   acknowledgment
//! - `disconnect` stops the task; buffered readings are left alone
//! - `apply` folds session events into the shared connection state and
//!   tells the caller when a replay pass is due
//!
//! Connection state only ever changes in `apply`. The manager never retries
//! on its own; a supervisor outside the core may call `connect` again.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{Instrument, Span, debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::config::BrokerSettings;
use crate::connection::event::{DisconnectReason, SessionEvent};
use crate::connection::session::Session;
use crate::connection::state::{ConnectionState, SharedState};
use crate::status::DeliveryStats;
use crate::transport::{ClientMessage, QOS_AT_LEAST_ONCE, SessionParams, run_session};
use crate::utils::error::TransportError;

/// How long to wait for a finished session's last event to be applied.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Progress of the latest session, as seen through applied events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Idle,
    /// Spawned, no connect outcome applied yet.
    Pending,
    Up,
    /// Failed to connect, or connected and then ended.
    Down,
}

struct SessionHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    settings: BrokerSettings,
    client_id: String,
    state: SharedState,
    attempt: watch::Sender<Attempt>,
    events: mpsc::UnboundedSender<SessionEvent>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    session: tokio::sync::Mutex<Option<SessionHandle>>,
    last_error: Mutex<Option<String>>,
    stats: Arc<DeliveryStats>,
    span: Span,
}

impl ConnectionManager {
    /// Create a manager for `settings`. Session events are sent to `events`;
    /// whoever consumes that channel must pass each one to `apply`.
    pub fn new(
        settings: BrokerSettings,
        client_id: impl Into<String>,
        events: mpsc::UnboundedSender<SessionEvent>,
        stats: Arc<DeliveryStats>,
        span: Span,
    ) -> Self {
        let (attempt, _) = watch::channel(Attempt::Idle);
        Self {
            settings,
            client_id: client_id.into(),
            state: SharedState::new(),
            attempt,
            events,
            outbound: Mutex::new(None),
            session: tokio::sync::Mutex::new(None),
            last_error: Mutex::new(None),
            stats,
            span,
        }
    }

    fn outbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<WsMessage>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    pub fn state_handle(&self) -> SharedState {
        self.state.clone()
    }

    /// `host:port` of the broker.
    pub fn broker_address(&self) -> String {
        self.settings.address()
    }

    /// Why the last connect attempt failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.connect_timeout_ms)
    }

    fn session_params(&self) -> SessionParams {
        SessionParams {
            url: self.settings.url(),
            client_id: self.client_id.clone(),
            credentials: self
                .settings
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
            keep_alive: Duration::from_secs(self.settings.keep_alive_secs.max(1)),
            handshake_timeout: self.connect_timeout(),
        }
    }

    /// Wait until the last event of an ended session has been applied.
    async fn settle(&self) {
        let mut attempt = self.attempt.subscribe();
        let settled = timeout(
            SETTLE_TIMEOUT,
            attempt.wait_for(|a| matches!(a, Attempt::Idle | Attempt::Down)),
        )
        .await;
        if settled.is_err() {
            debug!(parent: &self.span, "Final session event not applied within {SETTLE_TIMEOUT:?}");
        }
    }

    /// Start a session and wait for it to come up.
    ///
    /// Returns `true` once the session reports a successful connect, `false`
    /// on a reported failure, when the attempt is cancelled by `disconnect`,
    /// or when the connect timeout elapses. A timed-out attempt keeps running
    /// and may still connect later.
    pub async fn connect(&self) -> bool {
        let mut attempt = self.attempt.subscribe();
        {
            let mut session = self.session.lock().await;

            let ended = session.as_ref().is_some_and(|handle| {
                handle.task.is_finished() || *self.attempt.borrow() == Attempt::Down
            });
            if ended {
                if let Some(stale) = session.take() {
                    let _ = stale.shutdown.send(true);
                    let _ = stale.task.await;
                    self.settle().await;
                }
            }

            if session.is_some() {
                debug!(parent: &self.span, "Session already running, not starting another");
            } else {
                if self.settings.credentials().is_none()
                    && (self.settings.username.is_some() || self.settings.password.is_some())
                {
                    warn!(parent: &self.span, "Only one of username/password configured, connecting without auth");
                }

                info!(parent: &self.span, "Connecting to broker at {}", self.broker_address());
                self.record_error(None);
                self.attempt.send_replace(Attempt::Pending);

                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                *self.outbound() = Some(outbound_tx);

                let task = tokio::spawn(
                    run_session(
                        self.session_params(),
                        outbound_rx,
                        self.events.clone(),
                        shutdown_rx,
                    )
                    .instrument(self.span.clone()),
                );

                *session = Some(SessionHandle {
                    shutdown: shutdown_tx,
                    task,
                });
            }
        }

        let outcome = timeout(
            self.connect_timeout(),
            attempt.wait_for(|a| *a != Attempt::Pending),
        )
        .await;
        match outcome {
            Ok(Ok(current)) => *current == Attempt::Up,
            Ok(Err(_)) => false,
            Err(_) => {
                warn!(
                    parent: &self.span,
                    "Broker at {} did not acknowledge within {:?}, attempt left running",
                    self.broker_address(),
                    self.connect_timeout()
                );
                false
            }
        }
    }

    /// Stop the session task. Does nothing when no session is running.
    ///
    /// Frames already handed to the session are written before it closes.
    /// Publishes made from here on fail with `NotConnected`.
    pub async fn disconnect(&self) {
        let handle = self.session.lock().await.take();
        let Some(handle) = handle else {
            debug!(parent: &self.span, "Disconnect requested with no session running");
            return;
        };

        self.outbound().take();
        let _ = handle.shutdown.send(true);

        if let Err(e) = handle.task.await {
            warn!(parent: &self.span, "Session task ended abnormally: {e}");
        }
        self.settle().await;
        info!(parent: &self.span, "Disconnected from broker at {}", self.broker_address());
    }

    /// Fold one session event into the connection state.
    ///
    /// Returns `true` when the event is a successful connect, meaning the
    /// offline queue should be replayed now.
    pub fn apply(&self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::Connecting => {
                self.state.set(ConnectionState::Connecting);
                debug!(parent: &self.span, "Handshake with broker at {} started", self.broker_address());
                false
            }
            SessionEvent::Connect { reason, detail } => {
                if reason.is_success() {
                    self.state.set(ConnectionState::Connected);
                    self.record_error(None);
                    self.attempt.send_replace(Attempt::Up);
                    info!(parent: &self.span, "Connected to broker at {}", self.broker_address());
                    true
                } else {
                    self.state.set(ConnectionState::Disconnected);
                    let message = match detail {
                        Some(detail) => format!("{reason}: {detail}"),
                        None => reason.to_string(),
                    };
                    warn!(parent: &self.span, "Failed to connect to broker. Return code: {message}");
                    self.record_error(Some(message));
                    self.attempt.send_replace(Attempt::Down);
                    false
                }
            }
            SessionEvent::Disconnect { reason } => {
                let previous = self.state.set(ConnectionState::Disconnected);
                self.attempt.send_replace(Attempt::Down);
                match reason {
                    _ if previous == ConnectionState::Disconnected => {}
                    DisconnectReason::Requested => {
                        info!(parent: &self.span, "Session closed on request");
                    }
                    _ => warn!(parent: &self.span, "Disconnected from broker: {reason}"),
                }
                false
            }
            SessionEvent::PublishAck { message_id } => {
                self.stats.acked.fetch_add(1, Ordering::Relaxed);
                debug!(parent: &self.span, "Message {message_id} acknowledged by broker");
                false
            }
        }
    }
}

impl Session for ConnectionManager {
    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn publish(&self, topic: String, payload: String) -> Result<String, TransportError> {
        let message_id = Uuid::new_v4().to_string();
        let frame = ClientMessage::Publish {
            topic,
            payload,
            message_id: Some(message_id.clone()),
            qos: Some(QOS_AT_LEAST_ONCE),
        };
        let text = serde_json::to_string(&frame)?;

        let outbound = self.outbound();
        let sender = outbound.as_ref().ok_or(TransportError::NotConnected)?;
        sender
            .send(WsMessage::text(text))
            .map_err(|_| TransportError::ChannelClosed)?;

        Ok(message_id)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("broker", &self.broker_address())
            .field("client_id", &self.client_id)
            .field("state", &self.state.get())
            .finish()
    }
}
