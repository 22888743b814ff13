//! Configuration loading and validation tests
//!
//! Tests focus on observable outcomes: which values end up in the loaded
//! configuration and which files are rejected.

use gapi_mqtt::config::{ConfigError, HarnessConfig, Overrides};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[mqtt]
port = 1884
keep_alive_secs = 30
connect_timeout_secs = 3
client_id = "bench-01"
username_env = "MQTT_USER"
password_env = "MQTT_PASS"
"#
    )
    .unwrap();

    let config = HarnessConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.mqtt.port, 1884);
    assert_eq!(config.mqtt.keep_alive_secs, 30);
    assert_eq!(config.mqtt.connect_timeout_secs, 3);
    assert_eq!(config.mqtt.client_id.as_deref(), Some("bench-01"));
    assert_eq!(config.mqtt.username_env.as_deref(), Some("MQTT_USER"));
    assert_eq!(config.mqtt.password_env.as_deref(), Some("MQTT_PASS"));
}

#[test]
fn test_no_file_means_fixed_defaults() {
    let config = HarnessConfig::load(None).unwrap();

    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.keep_alive_secs, 60);
}

#[test]
fn test_missing_file_is_read_error() {
    let result = HarnessConfig::load(Some(Path::new("/nonexistent/gapi.toml")));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "[mqtt\nport = ").unwrap();

    let result = HarnessConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_zero_port_is_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "[mqtt]\nport = 0").unwrap();

    let result = HarnessConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_command_line_overrides_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "[mqtt]\nport = 1884\nclient_id = \"from-file\"").unwrap();

    let config = HarnessConfig::load(Some(temp_file.path()))
        .unwrap()
        .with_overrides(&Overrides {
            port: Some(2883),
            keep_alive_secs: None,
            client_id: Some("from-flag".to_string()),
        })
        .unwrap();

    assert_eq!(config.mqtt.port, 2883);
    assert_eq!(config.mqtt.keep_alive_secs, 60);
    assert_eq!(config.mqtt.client_id.as_deref(), Some("from-flag"));
}
