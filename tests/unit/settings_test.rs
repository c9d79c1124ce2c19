//! Unit tests for configuration loading

use std::io::Write;
use tokio_test::{assert_err, assert_ok};

use gateway_failover::config::Settings;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"
        [server]
        port = 9090

        [controller]
        topic_arn = "arn:aws:sns:eu-west-1:123456789012:squid-alarms"
        alarm_prefix = "proxy-alarm_"
        route_retry_attempts = 5
        per_group_lock = true

        [control_plane]
        kind = "http"
        endpoint = "http://control-plane.internal:8000"
        "#,
    );

    let settings = Settings::load_from_path(file.path()).unwrap();
    assert_eq!(settings.server.port, 9090);
    assert_eq!(settings.controller.alarm_prefix, "proxy-alarm_");
    assert_eq!(settings.controller.route_retry_attempts, 5);
    assert!(settings.controller.per_group_lock);
    assert_eq!(settings.controller.default_destination, "0.0.0.0/0");
    assert_eq!(settings.controller.home_tables_tag_key, "RouteTableIds");
    assert_ok!(settings.validate());
}

#[test]
fn test_missing_file_uses_defaults() {
    let settings = Settings::load_from_path("does/not/exist.toml").unwrap();
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.control_plane.kind, "http");
    assert_eq!(settings.controller.call_timeout_ms, 5000);
}

#[test]
fn test_memory_kind_without_topic_is_rejected() {
    let file = write_config(
        r#"
        [control_plane]
        kind = "memory"
        "#,
    );
    let mut settings = Settings::load_from_path(file.path()).unwrap();
    settings.controller.topic_arn.clear();
    assert_err!(settings.validate());
}

#[test]
fn test_zero_retry_attempts_rejected() {
    let mut settings = Settings::default();
    settings.controller.topic_arn = "arn:topic".to_string();
    settings.control_plane.kind = "memory".to_string();
    settings.controller.route_retry_attempts = 0;
    assert_err!(settings.validate());
}
