//! MQTT client built on rumqttc
//!
//! The module separates pure decisions from I/O:
//!
//! - [`connection`] - connection state, option building and CONNACK codes
//! - [`message_handler`] - event routing and publish acknowledgement tracking
//! - [`client`] - owns the rumqttc client and drives its event loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use gapi_mqtt::config::{BrokerAddress, MqttSection};
//! use gapi_mqtt::control::RunControl;
//! use gapi_mqtt::testing::RecordingHandler;
//! use gapi_mqtt::transport::mqtt::MqttClient;
//! use std::sync::Arc;
//!
//! # tokio_test_block_on(async {
//! let broker = BrokerAddress::parse("localhost", 1883)?;
//! let mut client = MqttClient::new(
//!     &broker,
//!     &MqttSection::default(),
//!     Arc::new(RecordingHandler::default()),
//!     RunControl::new(),
//! )?;
//! client.connect()?;
//! client.wait_connected().await?;
//! client.subscribe("sensors/#").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{ConnectionState, MqttError};
pub use message_handler::{AckOutcome, EventRoute, MessageHandler, PublishTracker};
