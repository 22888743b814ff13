//! Pure connection state management for the MQTT client
//!
//! This module holds the connection state observed by the harness, the
//! mapping from configuration to rumqttc options, and CONNACK code handling.

use crate::config::{BrokerAddress, MqttSection};
use rumqttc::{ConnectReturnCode, MqttOptions, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;

/// Largest packet accepted or sent, in bytes
const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP/MQTT handshake in progress
    Connecting,
    /// CONNACK accepted
    Connected,
    /// CONNACK carried a non-zero return code
    Refused(u8),
    /// Connection could not be established
    Failed(String),
    /// Connection ended after being established
    Disconnected(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether no further progress is possible on this connection
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Refused(_)
                | ConnectionState::Failed(_)
                | ConnectionState::Disconnected(_)
        )
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection refused, return_code={0}")]
    ConnectionRefused(u8),
    #[error("CONNACK timeout after {0:?}")]
    ConnectTimeout(Duration),
    #[error("Publishing failed")]
    PublishFailed(#[source] rumqttc::ClientError),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] rumqttc::ClientError),
    #[error("Event loop already started")]
    AlreadyStarted,
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Numeric MQTT 3.1.1 CONNACK return code
pub fn connack_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

/// Client id used when none is configured: `gapi-<pid>-<millis>`
pub fn generate_client_id() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("gapi-{}-{}", std::process::id(), millis)
}

/// Build rumqttc options for a broker from the harness configuration
pub fn configure_mqtt_options(broker: &BrokerAddress, config: &MqttSection) -> MqttOptions {
    let client_id = config.client_id.clone().unwrap_or_else(generate_client_id);
    let mut mqtt_options = MqttOptions::new(client_id, broker.host.clone(), broker.port);

    if broker.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.username() {
        mqtt_options.set_credentials(username, config.password());
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_clean_session(true);
    mqtt_options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    mqtt_options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_broker() -> BrokerAddress {
        BrokerAddress::parse("localhost", 1883).unwrap()
    }

    #[test]
    fn test_connack_codes() {
        assert_eq!(connack_code(ConnectReturnCode::Success), 0);
        assert_eq!(connack_code(ConnectReturnCode::RefusedProtocolVersion), 1);
        assert_eq!(connack_code(ConnectReturnCode::BadClientId), 2);
        assert_eq!(connack_code(ConnectReturnCode::ServiceUnavailable), 3);
        assert_eq!(connack_code(ConnectReturnCode::BadUserNamePassword), 4);
        assert_eq!(connack_code(ConnectReturnCode::NotAuthorized), 5);
    }

    #[test]
    fn test_generated_client_id_shape() {
        let id = generate_client_id();
        assert!(id.starts_with(&format!("gapi-{}-", std::process::id())));
    }

    #[test]
    fn test_configure_mqtt_options_uses_broker_and_keep_alive() {
        let options = configure_mqtt_options(&local_broker(), &MqttSection::default());
        assert_eq!(
            options.broker_address(),
            ("localhost".to_string(), 1883)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.clean_session());
        assert!(options.client_id().starts_with("gapi-"));
    }

    #[test]
    fn test_configured_client_id_is_used() {
        let config = MqttSection {
            client_id: Some("bench-01".to_string()),
            ..Default::default()
        };
        let options = configure_mqtt_options(&local_broker(), &config);
        assert_eq!(options.client_id(), "bench-01");
    }

    #[test]
    fn test_credentials_from_environment() {
        std::env::set_var("GAPI_TEST_MQTT_USER", "alice");
        std::env::set_var("GAPI_TEST_MQTT_PASS", "s3cret");
        let config = MqttSection {
            username_env: Some("GAPI_TEST_MQTT_USER".to_string()),
            password_env: Some("GAPI_TEST_MQTT_PASS".to_string()),
            ..Default::default()
        };
        let options = configure_mqtt_options(&local_broker(), &config);
        assert_eq!(
            options.credentials(),
            Some(("alice".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn test_no_credentials_without_username() {
        let options = configure_mqtt_options(&local_broker(), &MqttSection::default());
        assert_eq!(options.credentials(), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(ConnectionState::Refused(5).is_terminal());
        assert!(ConnectionState::Failed("io".to_string()).is_terminal());
        assert!(ConnectionState::Disconnected("bye".to_string()).is_terminal());
        assert!(ConnectionState::Connected.is_connected());
    }
}
