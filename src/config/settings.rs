use serde::{Deserialize, Serialize};

/// Top-level configuration settings for the transmitter.
///
/// Includes the broker endpoint, the publishing identity and queue bound,
/// and the log level used by the binary.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub transmitter: TransmitterSettings,
    pub logging: LoggingSettings,
}

/// Where the broker lives and how to authenticate against it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Interval between keep-alive pings on an idle session.
    pub keep_alive_secs: u64,
    /// Upper bound on how long `connect` waits for the session to come up.
    pub connect_timeout_ms: u64,
}

/// Publishing identity and offline buffering policy.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TransmitterSettings {
    pub base_topic: String,
    pub device_id: String,
    pub max_queue_size: usize,
    /// When set, a reading whose direct send fails is put back in the offline
    /// queue instead of being dropped.
    pub requeue_on_send_failure: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub transmitter: Option<PartialTransmitterSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialBrokerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialTransmitterSettings {
    pub base_topic: Option<String>,
    pub device_id: Option<String>,
    pub max_queue_size: Option<usize>,
    pub requeue_on_send_failure: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                host: "localhost".to_string(),
                port: 1883,
                username: None,
                password: None,
                keep_alive_secs: 60,
                connect_timeout_ms: 10_000,
            },
            transmitter: TransmitterSettings {
                base_topic: "sensors".to_string(),
                device_id: "sensor_device_1".to_string(),
                max_queue_size: 1000,
                requeue_on_send_failure: false,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Merge over the defaults, field by field.
    pub fn merge(self, default: Settings) -> Settings {
        let broker = self.broker.unwrap_or_default();
        let transmitter = self.transmitter.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            broker: BrokerSettings {
                host: broker.host.unwrap_or(default.broker.host),
                port: broker.port.unwrap_or(default.broker.port),
                username: broker.username.or(default.broker.username),
                password: broker.password.or(default.broker.password),
                keep_alive_secs: broker
                    .keep_alive_secs
                    .unwrap_or(default.broker.keep_alive_secs),
                connect_timeout_ms: broker
                    .connect_timeout_ms
                    .unwrap_or(default.broker.connect_timeout_ms),
            },
            transmitter: TransmitterSettings {
                base_topic: transmitter
                    .base_topic
                    .unwrap_or(default.transmitter.base_topic),
                device_id: transmitter
                    .device_id
                    .unwrap_or(default.transmitter.device_id),
                max_queue_size: transmitter
                    .max_queue_size
                    .unwrap_or(default.transmitter.max_queue_size),
                requeue_on_send_failure: transmitter
                    .requeue_on_send_failure
                    .unwrap_or(default.transmitter.requeue_on_send_failure),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}

impl BrokerSettings {
    /// `host:port`, as reported in the status surface.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// WebSocket URL of the broker.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Both username and password must be present to enable authentication.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl Settings {
    /// Check the settings and return every problem found.
    ///
    /// An empty list means the settings are usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.broker.host.trim().is_empty() {
            errors.push("broker.host must not be empty".into());
        }
        if self.broker.port == 0 {
            errors.push("broker.port must not be 0".into());
        }
        if self.broker.connect_timeout_ms == 0 {
            errors.push("broker.connect_timeout_ms must be greater than 0".into());
        }
        let has_user = self.broker.username.as_deref().is_some_and(|u| !u.is_empty());
        let has_pass = self.broker.password.as_deref().is_some_and(|p| !p.is_empty());
        if has_user != has_pass {
            errors.push(
                "broker.username and broker.password must be set together to enable auth".into(),
            );
        }
        if self.transmitter.base_topic.trim().is_empty() {
            errors.push("transmitter.base_topic must not be empty".into());
        }
        if self.transmitter.device_id.trim().is_empty() {
            errors.push("transmitter.device_id must not be empty".into());
        }
        if self.transmitter.max_queue_size == 0 {
            errors.push("transmitter.max_queue_size must be at least 1".into());
        }

        errors
    }
}
