//! Shared fixtures for the unit and scenario tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::Message as WsMessage;

use crate::config::Settings;
use crate::connection::{ConnectionState, Session, SharedState};
use crate::reading::{Position, Reading};
use crate::transport::websocket::CLIENT_ID_HEADER;
use crate::transport::{ClientMessage, ServerMessage};
use crate::utils::error::TransportError;

pub fn reading(timestamp: &str, sensor_type: &str, measurement_type: &str, value: f64) -> Reading {
    Reading::new(
        timestamp,
        sensor_type,
        measurement_type,
        value,
        Position::new(1.0, 2.0, 0.5),
    )
}

pub fn reading_at(timestamp: &str) -> Reading {
    reading(timestamp, "bmp280", "temperature", 21.5)
}

/// Extract the `timestamp` field of a published JSON payload.
pub fn payload_timestamp(payload: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(payload).expect("payload is JSON");
    value["timestamp"]
        .as_str()
        .expect("timestamp is a string")
        .to_string()
}

/// In-memory session whose state and failures are driven by the test.
#[derive(Debug, Default)]
pub struct MockSession {
    state: SharedState,
    fail: AtomicBool,
    // Reports connected but has no live sender, as while a session closes.
    closing: AtomicBool,
    // Number of publishes that succeed before every later one fails.
    fail_after: Mutex<Option<usize>>,
    attempts: AtomicUsize,
    published: Mutex<Vec<(String, String)>>,
}

impl MockSession {
    pub fn connected() -> Arc<Self> {
        let session = Self::default();
        session.state.set(ConnectionState::Connected);
        Arc::new(session)
    }

    pub fn disconnected() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.set(state);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn close_sender(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn fail_after(&self, successes: usize) {
        *self.fail_after.lock().unwrap() = Some(successes);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_timestamps(&self) -> Vec<String> {
        self.published()
            .iter()
            .map(|(_, payload)| payload_timestamp(payload))
            .collect()
    }
}

impl Session for MockSession {
    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn publish(&self, topic: String, payload: String) -> Result<String, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.closing.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        let mut published = self.published.lock().unwrap();
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if published.len() >= limit {
                return Err(TransportError::ChannelClosed);
            }
        }
        published.push((topic, payload));
        Ok(format!("mock-{}", published.len()))
    }
}

/// How the fake broker behaves towards connecting clients.
#[derive(Debug, Clone)]
pub struct FakeBrokerOptions {
    pub username: String,
    pub password: String,
    pub send_puback: bool,
    /// Accept the socket but never answer the login.
    pub silent: bool,
}

impl Default for FakeBrokerOptions {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            password: "password".into(),
            send_puback: true,
            silent: false,
        }
    }
}

/// A publish frame as received by the fake broker.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPublish {
    pub topic: String,
    pub payload: String,
    pub message_id: Option<String>,
    pub qos: Option<u8>,
}

/// Minimal in-process WebSocket broker speaking the transmitter protocol.
pub struct FakeBroker {
    pub addr: SocketAddr,
    published: Arc<Mutex<Vec<ReceivedPublish>>>,
    connections: Arc<AtomicUsize>,
    pings: Arc<AtomicUsize>,
    client_ids: Arc<Mutex<Vec<Option<String>>>>,
    kick: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl FakeBroker {
    pub async fn start() -> Self {
        Self::start_with(FakeBrokerOptions::default()).await
    }

    pub async fn start_with(options: FakeBrokerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake broker");
        let addr = listener.local_addr().expect("local addr");
        let published = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let pings = Arc::new(AtomicUsize::new(0));
        let client_ids = Arc::new(Mutex::new(Vec::new()));
        let (kick, _) = broadcast::channel(4);

        let task = {
            let published = published.clone();
            let connections = connections.clone();
            let pings = pings.clone();
            let client_ids = client_ids.clone();
            let kick = kick.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let options = options.clone();
                    let published = published.clone();
                    let pings = pings.clone();
                    let client_ids = client_ids.clone();
                    let mut kicked = kick.subscribe();
                    connections.fetch_add(1, Ordering::SeqCst);

                    tokio::spawn(async move {
                        let record_client_id =
                            move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                                let client_id = request
                                    .headers()
                                    .get(CLIENT_ID_HEADER)
                                    .and_then(|value| value.to_str().ok())
                                    .map(str::to_string);
                                client_ids.lock().unwrap().push(client_id);
                                Ok(response)
                            };
                        let Ok(ws) = accept_hdr_async(stream, record_client_id).await else {
                            return;
                        };
                        let (mut sink, mut source) = ws.split();

                        loop {
                            tokio::select! {
                                _ = kicked.recv() => {
                                    let _ = sink.send(WsMessage::Close(None)).await;
                                    break;
                                }
                                incoming = source.next() => {
                                    let text = match incoming {
                                        Some(Ok(WsMessage::Text(text))) => text,
                                        Some(Ok(WsMessage::Ping(_))) => {
                                            pings.fetch_add(1, Ordering::SeqCst);
                                            continue;
                                        }
                                        Some(Ok(_)) => continue,
                                        _ => break,
                                    };
                                    if options.silent {
                                        continue;
                                    }
                                    let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                                        Ok(ClientMessage::Login { username, password }) => {
                                            if username == options.username && password == options.password {
                                                Some(ServerMessage::LoginResponse { token: "test-token".into() })
                                            } else {
                                                Some(ServerMessage::Error { message: "invalid credentials".into() })
                                            }
                                        }
                                        Ok(ClientMessage::Auth { token }) => {
                                            if token == "test-token" {
                                                Some(ServerMessage::Authenticated {})
                                            } else {
                                                Some(ServerMessage::Error { message: "authentication failed".into() })
                                            }
                                        }
                                        Ok(ClientMessage::Publish { topic, payload, message_id, qos }) => {
                                            published.lock().unwrap().push(ReceivedPublish {
                                                topic,
                                                payload,
                                                message_id: message_id.clone(),
                                                qos,
                                            });
                                            match (options.send_puback, message_id) {
                                                (true, Some(message_id)) => Some(ServerMessage::PublishAck { message_id }),
                                                _ => None,
                                            }
                                        }
                                        Err(_) => None,
                                    };
                                    if let Some(reply) = reply {
                                        let text = serde_json::to_string(&reply).unwrap();
                                        if sink.send(WsMessage::text(text)).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                    });
                }
            })
        };

        Self {
            addr,
            published,
            connections,
            pings,
            client_ids,
            kick,
            task,
        }
    }

    /// Settings pointing at this broker with its credentials.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.broker.host = self.addr.ip().to_string();
        settings.broker.port = self.addr.port();
        settings.broker.username = Some("admin".into());
        settings.broker.password = Some("password".into());
        settings.broker.connect_timeout_ms = 2_000;
        settings
    }

    pub fn published(&self) -> Vec<ReceivedPublish> {
        self.published.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Keep-alive pings received across all connections.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Client id header of each upgrade request, in arrival order.
    pub fn client_ids(&self) -> Vec<Option<String>> {
        self.client_ids.lock().unwrap().clone()
    }

    /// Wait until at least `count` publishes arrived, or panic after `limit`.
    pub async fn wait_for_published(&self, count: usize, limit: Duration) -> Vec<ReceivedPublish> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let published = self.published();
            if published.len() >= count {
                return published;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "expected {count} publishes, broker saw {}",
                    published.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Close every open client connection from the broker side.
    pub fn kick_all(&self) {
        let _ = self.kick.send(());
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll `check` until it holds, or panic after `limit`.
pub async fn wait_until<F>(limit: Duration, what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Settings pointing at a local port nothing listens on.
pub async fn unreachable_settings() -> Settings {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let mut settings = Settings::default();
    settings.broker.host = addr.ip().to_string();
    settings.broker.port = addr.port();
    settings.broker.connect_timeout_ms = 1_000;
    settings
}
