use super::settings::{PartialBrokerSettings, PartialSettings, PartialTransmitterSettings};
use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.host, "localhost");
    assert_eq!(settings.broker.port, 1883);
    assert_eq!(settings.broker.username, None);
    assert_eq!(settings.broker.password, None);
    assert_eq!(settings.broker.connect_timeout_ms, 10_000);
    assert_eq!(settings.transmitter.base_topic, "sensors");
    assert_eq!(settings.transmitter.device_id, "sensor_device_1");
    assert_eq!(settings.transmitter.max_queue_size, 1000);
    assert!(!settings.transmitter.requeue_on_send_failure);
    assert!(settings.validate().is_empty());
}

#[test]
fn test_broker_address_and_url() {
    let settings = Settings::default();
    assert_eq!(settings.broker.address(), "localhost:1883");
    assert_eq!(settings.broker.url(), "ws://localhost:1883");
}

#[test]
fn test_credentials_require_both_fields() {
    let mut settings = Settings::default();
    settings.broker.username = Some("admin".into());
    assert_eq!(settings.broker.credentials(), None);
    assert_eq!(settings.validate().len(), 1);

    settings.broker.password = Some("password".into());
    assert_eq!(settings.broker.credentials(), Some(("admin", "password")));
    assert!(settings.validate().is_empty());
}

#[test]
fn test_validate_reports_every_problem() {
    let mut settings = Settings::default();
    settings.broker.port = 0;
    settings.transmitter.device_id = "  ".into();
    settings.transmitter.max_queue_size = 0;

    let errors = settings.validate();
    assert_eq!(errors.len(), 3, "errors: {errors:?}");
}

#[test]
fn test_partial_merge_keeps_defaults_for_missing_fields() {
    let partial = PartialSettings {
        broker: Some(PartialBrokerSettings {
            port: Some(8080),
            ..Default::default()
        }),
        transmitter: Some(PartialTransmitterSettings {
            max_queue_size: Some(2),
            ..Default::default()
        }),
        logging: None,
    };

    let settings = partial.merge(Settings::default());
    assert_eq!(settings.broker.port, 8080);
    assert_eq!(settings.broker.host, "localhost");
    assert_eq!(settings.transmitter.max_queue_size, 2);
    assert_eq!(settings.transmitter.base_topic, "sensors");
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("transmitter.toml");
    let toml = r#"
        [broker]
        host = "broker.local"
        port = 9001
        username = "admin"
        password = "password"

        [transmitter]
        device_id = "greenhouse_2"
        max_queue_size = 50
        requeue_on_send_failure = true
    "#;
    fs::write(&path, toml).expect("write config file");

    let cfg = load_config_from(path.to_str().expect("utf-8 path")).expect("load_config failed");
    assert_eq!(cfg.broker.host, "broker.local");
    assert_eq!(cfg.broker.port, 9001);
    assert_eq!(cfg.broker.credentials(), Some(("admin", "password")));
    assert_eq!(cfg.transmitter.device_id, "greenhouse_2");
    assert_eq!(cfg.transmitter.base_topic, "sensors");
    assert_eq!(cfg.transmitter.max_queue_size, 50);
    assert!(cfg.transmitter.requeue_on_send_failure);
}

#[test]
#[serial]
fn load_config_missing_file_uses_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("absent");

    let cfg = load_config_from(path.to_str().expect("utf-8 path")).expect("load_config failed");
    assert_eq!(cfg, Settings::default());
}

#[test]
#[serial]
fn environment_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("transmitter.toml");
    fs::write(&path, "[broker]\nhost = \"from-file\"\nport = 1999\n").expect("write config file");

    temp_env::with_vars(
        [
            ("TRANSMITTER_BROKER__HOST", Some("from-env")),
            ("TRANSMITTER_TRANSMITTER__BASE_TOPIC", Some("plant")),
        ],
        || {
            let cfg = load_config_from(path.to_str().expect("utf-8 path"))
                .expect("load_config failed");
            assert_eq!(cfg.broker.host, "from-env");
            assert_eq!(cfg.broker.port, 1999);
            assert_eq!(cfg.transmitter.base_topic, "plant");
        },
    );
}

#[test]
#[serial]
fn load_config_reads_shipped_default_file() {
    temp_env::with_vars(
        [
            ("TRANSMITTER_BROKER__HOST", None::<&str>),
            ("TRANSMITTER_BROKER__PORT", Some("1884")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.broker.host, "localhost");
            assert_eq!(cfg.broker.port, 1884);
            assert_eq!(cfg.transmitter.device_id, "sensor_device_1");
            assert_eq!(cfg.transmitter.max_queue_size, 1000);
        },
    );
}
