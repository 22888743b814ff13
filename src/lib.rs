//! GAPI MQTT - publish/subscribe test harness
//!
//! Connects to an MQTT broker, then either publishes one message with QoS 1
//! and waits for its acknowledgement, or subscribes with QoS 0 and prints
//! every message until interrupted.
//!
//! # Quick Start
//!
//! ```no_run
//! use gapi_mqtt::config::HarnessConfig;
//! use gapi_mqtt::console::ConsoleHandler;
//! use gapi_mqtt::harness::{Action, Session};
//! use std::sync::Arc;
//!
//! # async fn example() -> gapi_mqtt::HarnessResult<()> {
//! let action = Action::Publish {
//!     topic: "sensors/kitchen".to_string(),
//!     message: "21.5".to_string(),
//! };
//! let reason = Session::new("localhost", action, HarnessConfig::default(), Arc::new(ConsoleHandler))
//!     .run()
//!     .await?;
//! assert!(reason.is_success());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod console;
pub mod control;
pub mod error;
pub mod harness;
pub mod observability;
pub mod testing;
pub mod transport;

pub use config::{BrokerAddress, ConfigError, HarnessConfig};
pub use control::{RunControl, StopReason};
pub use error::{HarnessError, HarnessResult};
pub use transport::mqtt::MqttClient;
pub use transport::{DisconnectReason, EventHandler, ReceivedMessage};
