//! Mock implementations for testing

use crate::transport::{DisconnectReason, EventHandler, ReceivedMessage};
use std::sync::{Mutex, MutexGuard};

/// One recorded callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerCall {
    Connect(u8),
    Disconnect(DisconnectReason),
    Publish(u16),
    Message(ReceivedMessage),
    Subscribe { mid: u16, granted: Vec<Option<u8>> },
}

/// Handler that keeps every callback in order.
///
/// SUBACKs are recorded only when `record_subscribe` is set, so most tests
/// can compare call lists without caring about subscription bookkeeping.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<HandlerCall>>,
    record_subscribe: bool,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribe_calls() -> Self {
        Self {
            record_subscribe: true,
            ..Default::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HandlerCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.lock().clone()
    }

    pub fn messages(&self) -> Vec<ReceivedMessage> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                HandlerCall::Message(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HandlerCall) {
        self.lock().push(call);
    }
}

impl EventHandler for RecordingHandler {
    fn on_connect(&self, return_code: u8) {
        self.record(HandlerCall::Connect(return_code));
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        self.record(HandlerCall::Disconnect(reason.clone()));
    }

    fn on_publish(&self, mid: u16) {
        self.record(HandlerCall::Publish(mid));
    }

    fn on_message(&self, message: &ReceivedMessage) {
        self.record(HandlerCall::Message(message.clone()));
    }

    fn on_subscribe(&self, mid: u16, granted: &[Option<u8>]) {
        if self.record_subscribe {
            self.record(HandlerCall::Subscribe {
                mid,
                granted: granted.to_vec(),
            });
        }
    }
}
