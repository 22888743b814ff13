//! Error types for the MQTT pub/sub harness
//!
//! Every failure the harness can report maps onto one of the library's
//! failure classes (connect, subscribe, publish) or onto a local problem
//! with arguments or configuration. All of them end the process with a
//! non-zero status.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for harness operations
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("could not connect to {broker}: {reason}")]
    ConnectFailed { broker: String, reason: String },

    #[error("connection to {broker} refused, return_code={code}")]
    ConnectRefused { broker: String, code: u8 },

    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("{0}")]
    Fault(String),
}

impl HarnessError {
    /// Create connect failure error
    pub fn connect_failed<B: Into<String>, R: ToString>(broker: B, reason: R) -> Self {
        Self::ConnectFailed {
            broker: broker.into(),
            reason: reason.to_string(),
        }
    }

    /// Create subscribe failure error
    pub fn subscribe_failed<R: ToString>(reason: R) -> Self {
        Self::SubscribeFailed(reason.to_string())
    }

    /// Create publish failure error
    pub fn publish_failed<R: ToString>(reason: R) -> Self {
        Self::PublishFailed(reason.to_string())
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;
