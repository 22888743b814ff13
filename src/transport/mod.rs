//! Transport layer for the harness
//!
//! The client library reports connection, delivery and message events through
//! the [`EventHandler`] trait. Handlers run on the event-loop task and must not
//! block.

pub mod mqtt;

/// Message delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

impl ReceivedMessage {
    /// Payload rendered as text, replacing invalid UTF-8
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// How a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// DISCONNECT sent by this client
    Requested,
    /// Broker or network closed the connection
    Lost(String),
}

/// Callbacks fired by the client event loop
pub trait EventHandler: Send + Sync {
    /// CONNACK received; `return_code` is 0 on success
    fn on_connect(&self, return_code: u8);

    fn on_disconnect(&self, reason: &DisconnectReason);

    /// Broker acknowledged the publish with this message id
    fn on_publish(&self, mid: u16);

    fn on_message(&self, message: &ReceivedMessage);

    /// SUBACK received; `None` entries are rejected filters
    fn on_subscribe(&self, _mid: u16, _granted: &[Option<u8>]) {}
}
