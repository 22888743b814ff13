//! Run control shared between the harness, the event loop and signal handling
//!
//! A [`RunControl`] starts in the running state. Any holder may stop it once;
//! the first stop reason is kept and later requests are ignored.

use std::sync::Arc;
use tokio::sync::watch;

/// Why the run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Interrupt or terminate signal with its number
    Signal(i32),
    /// Broker acknowledged the message published by this run
    PublishAcknowledged,
    /// Connection check finished
    Connected,
    /// Unrecoverable problem reported by the event loop
    Fault(String),
}

impl StopReason {
    /// Whether the process should exit successfully for this reason
    pub fn is_success(&self) -> bool {
        !matches!(self, StopReason::Fault(_))
    }
}

/// Cloneable "keep running" token
#[derive(Debug, Clone)]
pub struct RunControl {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

impl RunControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request the run to stop. Returns true if this call set the reason.
    pub fn stop(&self, reason: StopReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_running(&self) -> bool {
        self.tx.borrow().is_none()
    }

    /// Reason recorded by the first stop, if any
    pub fn reason(&self) -> Option<StopReason> {
        self.tx.borrow().clone()
    }

    /// Wait until the run is stopped and return the reason
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return StopReason::Fault("run control closed".to_string());
            }
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}
