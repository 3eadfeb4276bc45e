use serde::{Deserialize, Serialize};

/// Broker-acknowledged delivery.
pub const QOS_AT_LEAST_ONCE: u8 = 1;

/// Frames sent by the transmitter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "login")]
    Login { username: String, password: String },
    #[serde(rename = "auth")]
    Auth { token: String },
    #[serde(rename = "publish")]
    Publish {
        topic: String,
        payload: String,
        message_id: Option<String>,
        qos: Option<u8>,
    },
}

/// Frames received from the broker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "login_response")]
    LoginResponse { token: String },
    #[serde(rename = "authenticated")]
    Authenticated {},
    #[serde(rename = "puback")]
    PublishAck { message_id: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "message")]
    Message {
        topic: String,
        payload: String,
        timestamp: i64,
        message_id: String,
        qos: u8,
    },
}
