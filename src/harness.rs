//! One MQTT session from connect to disconnect
//!
//! The harness owns the control flow: it installs the signal listener,
//! connects, performs the requested action, waits on the [`RunControl`] and
//! always disconnects before returning. Everything it learns from the event
//! loop arrives through the connection state or the run control.

use crate::config::{BrokerAddress, HarnessConfig};
use crate::console::{published_line, signal_line, subscribed_line};
use crate::control::{RunControl, StopReason};
use crate::error::{HarnessError, HarnessResult};
use crate::transport::mqtt::{MqttClient, MqttError};
use crate::transport::EventHandler;
use futures::stream::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

/// What to do once connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Subscribe and print messages until stopped
    Subscribe { topic: String },
    /// Publish once and wait for the acknowledgement
    Publish { topic: String, message: String },
    /// Connect and disconnect again
    CheckConnection,
}

/// Inputs for one session
pub struct Session {
    broker: String,
    action: Action,
    config: HarnessConfig,
    handler: Arc<dyn EventHandler>,
    run: RunControl,
    listen_for_signals: bool,
}

impl Session {
    pub fn new(
        broker: impl Into<String>,
        action: Action,
        config: HarnessConfig,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            broker: broker.into(),
            action,
            config,
            handler,
            run: RunControl::new(),
            listen_for_signals: true,
        }
    }

    /// Leave SIGINT/SIGTERM handling to the caller
    pub fn without_signal_handling(mut self) -> Self {
        self.listen_for_signals = false;
        self
    }

    /// Token that stops this session when stopped from outside
    pub fn run_control(&self) -> RunControl {
        self.run.clone()
    }

    /// Run the session to completion
    ///
    /// Returns the reason the run ended. A fault recorded by the event loop
    /// is returned as [`HarnessError::Fault`].
    pub async fn run(self) -> HarnessResult<StopReason> {
        let span = crate::mqtt_span!(broker = %self.broker);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> HarnessResult<StopReason> {
        let address = BrokerAddress::parse(&self.broker, self.config.mqtt.port)?;

        let listener = if self.listen_for_signals {
            Some(SignalListener::spawn(self.run.clone())?)
        } else {
            None
        };

        let mut client = MqttClient::new(
            &address,
            &self.config.mqtt,
            self.handler.clone(),
            self.run.clone(),
        )
        .map_err(|e| HarnessError::connect_failed(&self.broker, e))?;

        let outcome = match client.connect() {
            Ok(()) => drive(&client, &self.run, &self.broker, &self.action).await,
            Err(e) => Err(HarnessError::connect_failed(&self.broker, e)),
        };

        client.disconnect().await;
        if let Some(listener) = listener {
            listener.close().await;
        }

        debug!("Session finished: {:?}", outcome);
        outcome
    }
}

/// Wait for the connection, perform the action, wait for the stop reason
async fn drive(
    client: &MqttClient,
    run: &RunControl,
    broker: &str,
    action: &Action,
) -> HarnessResult<StopReason> {
    tokio::select! {
        connected = client.wait_connected() => {
            connected.map_err(|e| connect_error(broker, e))?;
        }
        reason = run.stopped() => {
            info!("Stopped before connection completed: {:?}", reason);
            return finish(reason);
        }
    }

    info!("Connected to {}", broker);

    match action {
        Action::Subscribe { topic } => {
            client
                .subscribe(topic)
                .await
                .map_err(HarnessError::subscribe_failed)?;
            println!("{}", subscribed_line(topic, broker));
        }
        Action::Publish { topic, message } => {
            client
                .publish(topic, message.as_bytes())
                .await
                .map_err(HarnessError::publish_failed)?;
            println!("{}", published_line(topic, broker, message));
        }
        Action::CheckConnection => {
            run.stop(StopReason::Connected);
        }
    }

    finish(run.stopped().await)
}

fn finish(reason: StopReason) -> HarnessResult<StopReason> {
    match reason {
        StopReason::Fault(message) => Err(HarnessError::Fault(message)),
        reason => Ok(reason),
    }
}

fn connect_error(broker: &str, error: MqttError) -> HarnessError {
    match error {
        MqttError::ConnectionRefused(code) => HarnessError::ConnectRefused {
            broker: broker.to_string(),
            code,
        },
        other => HarnessError::connect_failed(broker, other),
    }
}

/// Background task turning SIGINT/SIGTERM into a stop request
struct SignalListener {
    handle: Handle,
    task: JoinHandle<()>,
}

impl SignalListener {
    fn spawn(run: RunControl) -> HarnessResult<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(HarnessError::Signals)?;
        let handle = signals.handle();

        let task = tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                eprintln!("{}", signal_line(signal));
                if !run.stop(StopReason::Signal(signal)) {
                    debug!("Signal {} ignored, already stopping", signal);
                }
            }
        });

        Ok(Self { handle, task })
    }

    async fn close(self) {
        self.handle.close();
        if let Err(e) = self.task.await {
            debug!("Signal task ended with error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HandlerCall, RecordingHandler};
    use std::time::Duration;

    fn closed_port_config() -> HarnessConfig {
        // port 1 is privileged and nothing listens there in test environments
        let mut config = HarnessConfig::default();
        config.mqtt.port = 1;
        config.mqtt.connect_timeout_secs = 5;
        config
    }

    #[test]
    fn test_finish_maps_fault_to_error() {
        assert!(matches!(
            finish(StopReason::Fault("lost".to_string())),
            Err(HarnessError::Fault(msg)) if msg == "lost"
        ));
        assert_eq!(finish(StopReason::Signal(2)).unwrap(), StopReason::Signal(2));
    }

    #[test]
    fn test_connect_error_mapping() {
        assert!(matches!(
            connect_error("b", MqttError::ConnectionRefused(5)),
            HarnessError::ConnectRefused { code: 5, .. }
        ));
        let err = connect_error("b", MqttError::ConnectTimeout(Duration::from_secs(1)));
        assert!(err.to_string().starts_with("could not connect to b"));
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_fast() {
        let handler = Arc::new(RecordingHandler::default());
        let session = Session::new(
            "127.0.0.1",
            Action::CheckConnection,
            closed_port_config(),
            handler.clone(),
        )
        .without_signal_handling();

        let result = tokio::time::timeout(Duration::from_secs(10), session.run())
            .await
            .expect("connect failure must not hang");

        assert!(matches!(result, Err(HarnessError::ConnectFailed { .. })));
        assert!(!handler
            .calls()
            .iter()
            .any(|call| matches!(call, HandlerCall::Connect(0))));
    }

    #[tokio::test]
    async fn test_invalid_broker_is_config_error() {
        let session = Session::new(
            "mqtt://",
            Action::CheckConnection,
            HarnessConfig::default(),
            Arc::new(RecordingHandler::default()),
        )
        .without_signal_handling();

        assert!(matches!(session.run().await, Err(HarnessError::Config(_))));
    }

    #[tokio::test]
    async fn test_stop_before_connect_ends_successfully() {
        let session = Session::new(
            "127.0.0.1",
            Action::Subscribe {
                topic: "t".to_string(),
            },
            closed_port_config(),
            Arc::new(RecordingHandler::default()),
        )
        .without_signal_handling();
        session.run_control().stop(StopReason::Signal(15));

        let result = tokio::time::timeout(Duration::from_secs(10), session.run())
            .await
            .expect("stopped session must not hang");

        // either the stop or the refused TCP connect wins the race
        match result {
            Ok(reason) => assert_eq!(reason, StopReason::Signal(15)),
            Err(err) => assert!(matches!(err, HarnessError::ConnectFailed { .. })),
        }
    }
}
