//! Human-readable status lines
//!
//! Confirmations and received messages go to stdout, failures and signal
//! notices to stderr. The line formats are stable so scripts can grep them.

use crate::transport::{DisconnectReason, EventHandler, ReceivedMessage};
use tracing::debug;

pub fn connected_line() -> String {
    "[connected] OK".to_string()
}

pub fn connect_failed_line(return_code: u8) -> String {
    format!("[connect] failed, return_code={return_code}")
}

pub fn disconnected_line(reason: &DisconnectReason) -> String {
    match reason {
        DisconnectReason::Requested => "[disconnected] return_code=0".to_string(),
        DisconnectReason::Lost(reason) => format!("[disconnected] connection lost: {reason}"),
    }
}

pub fn message_line(message: &ReceivedMessage) -> String {
    format!(
        "[msg] topic={} payload={}",
        message.topic,
        message.payload_text()
    )
}

pub fn subscribed_line(topic: &str, broker: &str) -> String {
    format!("Subscribed to {topic} on {broker} - waiting for messages...")
}

pub fn published_line(topic: &str, broker: &str, message: &str) -> String {
    format!("Published to {topic} on {broker}: {message}")
}

pub fn signal_line(signal: i32) -> String {
    format!("Caught signal {signal}, disconnecting...")
}

/// Handler printing one line per callback
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleHandler;

impl EventHandler for ConsoleHandler {
    fn on_connect(&self, return_code: u8) {
        if return_code == 0 {
            println!("{}", connected_line());
        } else {
            eprintln!("{}", connect_failed_line(return_code));
        }
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        println!("{}", disconnected_line(reason));
    }

    fn on_publish(&self, mid: u16) {
        debug!("Publish acknowledged, mid={}", mid);
    }

    fn on_message(&self, message: &ReceivedMessage) {
        println!("{}", message_line(message));
    }

    fn on_subscribe(&self, mid: u16, granted: &[Option<u8>]) {
        debug!("Subscription acknowledged, mid={} granted={:?}", mid, granted);
    }
}
