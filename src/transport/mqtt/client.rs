//! Impure I/O operations for the MQTT client
//!
//! `MqttClient` owns the rumqttc `AsyncClient` and spawns one task that
//! polls the `EventLoop`. That task is the only writer of the connection
//! state and the place where [`EventHandler`] callbacks fire.

use super::connection::{configure_mqtt_options, connack_code, ConnectionState, MqttError};
use super::message_handler::{AckOutcome, EventRoute, MessageHandler, PublishTracker};
use crate::config::{BrokerAddress, MqttSection};
use crate::control::{RunControl, StopReason};
use crate::transport::{DisconnectReason, EventHandler};
use rumqttc::{AsyncClient, ConnectionError, EventLoop, QoS, StateError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the request channel between client and event loop
const REQUEST_CAPACITY: usize = 10;

/// Time allowed for the event loop to finish after DISCONNECT
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// QoS used for publishes
pub const PUBLISH_QOS: QoS = QoS::AtLeastOnce;

/// QoS requested for subscriptions
pub const SUBSCRIBE_QOS: QoS = QoS::AtMostOnce;

/// MQTT client for a single broker connection
pub struct MqttClient {
    client: AsyncClient,
    event_loop: Option<EventLoop>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    handler: Arc<dyn EventHandler>,
    run: RunControl,
    connect_timeout: Duration,
}

/// Everything the event-loop task needs
struct LoopContext {
    state_tx: Arc<watch::Sender<ConnectionState>>,
    handler: Arc<dyn EventHandler>,
    run: RunControl,
    tracker: PublishTracker,
}

/// Whether the event loop keeps polling
#[derive(Debug, PartialEq, Eq)]
enum LoopFlow {
    Continue,
    Stop,
}

impl MqttClient {
    pub fn new(
        broker: &BrokerAddress,
        config: &MqttSection,
        handler: Arc<dyn EventHandler>,
        run: RunControl,
    ) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(broker, config);
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        Ok(Self {
            client,
            event_loop: Some(event_loop),
            event_loop_handle: None,
            state_tx: Arc::new(state_tx),
            state_rx,
            handler,
            run,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }

    /// Start driving the event loop on a background task
    pub fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self.event_loop.take().ok_or(MqttError::AlreadyStarted)?;

        let context = LoopContext {
            state_tx: self.state_tx.clone(),
            handler: self.handler.clone(),
            run: self.run.clone(),
            tracker: PublishTracker::new(),
        };

        self.event_loop_handle = Some(tokio::spawn(drive_event_loop(event_loop, context)));
        Ok(())
    }

    /// Wait for CONNACK, bounded by the configured connect timeout
    pub async fn wait_connected(&self) -> Result<(), MqttError> {
        Self::wait_for_connection_confirmation(self.state_rx.clone(), self.connect_timeout).await
    }

    /// Wait until the state leaves `Connecting`
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                let state = state_rx.borrow_and_update().clone();
                match state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Refused(code) => {
                        return Err(MqttError::ConnectionRefused(code))
                    }
                    ConnectionState::Failed(reason) | ConnectionState::Disconnected(reason) => {
                        return Err(MqttError::ConnectionFailed(reason))
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectTimeout(timeout)),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state = self.connection_state();
        if state.is_connected() {
            Ok(())
        } else {
            Err(MqttError::NotConnected { state })
        }
    }

    /// Publish `payload` to `topic` with QoS 1, not retained
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        self.check_connection_state()?;

        self.client
            .publish(topic, PUBLISH_QOS, false, payload.to_vec())
            .await
            .map_err(MqttError::PublishFailed)?;

        debug!("Queued publish to {} ({} bytes)", topic, payload.len());
        Ok(())
    }

    /// Subscribe to `topic` with QoS 0
    pub async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.check_connection_state()?;

        self.client
            .subscribe(topic, SUBSCRIBE_QOS)
            .await
            .map_err(MqttError::SubscriptionFailed)?;

        info!("Subscription requested: {}", topic);
        Ok(())
    }

    /// Send DISCONNECT and wait for the event loop to finish
    pub async fn disconnect(&mut self) {
        let state = self.connection_state();
        if state.is_terminal() {
            debug!("Connection already ended ({:?}), not sending DISCONNECT", state);
        } else if let Err(e) = self.client.disconnect().await {
            debug!("Disconnect request not delivered: {}", e);
        }

        if let Some(mut handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
                Ok(Err(e)) => warn!("Event loop task ended with error: {}", e),
                Err(_) => {
                    warn!("Event loop task didn't shut down gracefully, aborting");
                    handle.abort();
                }
            }
        }
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

/// Poll the rumqttc event loop until the connection ends
async fn drive_event_loop(mut event_loop: EventLoop, mut context: LoopContext) {
    debug!("Starting MQTT event loop");
    loop {
        let flow = match event_loop.poll().await {
            Ok(event) => {
                let route = MessageHandler::route_mqtt_event(&event);
                process_event_route(route, &mut context)
            }
            Err(error) => {
                handle_event_loop_error(error, &context);
                LoopFlow::Stop
            }
        };

        if flow == LoopFlow::Stop {
            break;
        }
    }
    debug!("MQTT event loop stopped");
}

/// Apply one routed event to state, tracker and handler
fn process_event_route(route: EventRoute, context: &mut LoopContext) -> LoopFlow {
    match route {
        EventRoute::ConnectionAcknowledged(0) => {
            context.state_tx.send_replace(ConnectionState::Connected);
            context.handler.on_connect(0);
            LoopFlow::Continue
        }
        EventRoute::ConnectionAcknowledged(code) => {
            refuse(code, context);
            LoopFlow::Stop
        }
        EventRoute::MessageReceived(message) => {
            context.handler.on_message(&message);
            LoopFlow::Continue
        }
        EventRoute::PublishSent(mid) => {
            context.tracker.record_sent(mid);
            LoopFlow::Continue
        }
        EventRoute::PublishAcknowledged(mid) => {
            match context.tracker.acknowledge(mid) {
                AckOutcome::Expected(mid) => {
                    context.handler.on_publish(mid);
                    context.run.stop(StopReason::PublishAcknowledged);
                }
                AckOutcome::Unexpected { got, expected } => {
                    context.run.stop(unexpected_ack(got, expected));
                }
            }
            LoopFlow::Continue
        }
        EventRoute::SubscriptionAcknowledged { mid, granted } => {
            context.handler.on_subscribe(mid, &granted);
            if let Err(reason) = MessageHandler::validate_subscription_success(&granted) {
                context
                    .run
                    .stop(StopReason::Fault(format!("Subscribe failed: {reason}")));
            }
            LoopFlow::Continue
        }
        EventRoute::Disconnected => {
            lose_connection("broker sent DISCONNECT".to_string(), context);
            LoopFlow::Stop
        }
        EventRoute::DisconnectSent => {
            context
                .state_tx
                .send_replace(ConnectionState::Disconnected("client disconnected".to_string()));
            context.handler.on_disconnect(&DisconnectReason::Requested);
            LoopFlow::Stop
        }
        EventRoute::Infrastructure => LoopFlow::Continue,
    }
}

fn handle_event_loop_error(error: ConnectionError, context: &LoopContext) {
    if let ConnectionError::ConnectionRefused(code) = &error {
        refuse(connack_code(*code), context);
        return;
    }

    // rumqttc rejects acknowledgements for ids it has no record of before
    // they reach the event stream
    if let ConnectionError::MqttState(StateError::Unsolicited(got)) = &error {
        context
            .state_tx
            .send_replace(ConnectionState::Disconnected(error.to_string()));
        context.run.stop(unexpected_ack(*got, context.tracker.sent()));
        return;
    }

    let was_connected = context.state_tx.borrow().is_connected();
    if was_connected {
        lose_connection(error.to_string(), context);
    } else {
        debug!("MQTT connection attempt failed: {}", error);
        context
            .state_tx
            .send_replace(ConnectionState::Failed(error.to_string()));
    }
}

fn unexpected_ack(got: u16, expected: Option<u16>) -> StopReason {
    let expected = expected.map_or("none".to_string(), |mid| mid.to_string());
    StopReason::Fault(format!("[publish] mid={got} (not expected {expected})"))
}

fn refuse(code: u8, context: &LoopContext) {
    context.state_tx.send_replace(ConnectionState::Refused(code));
    context.handler.on_connect(code);
}

fn lose_connection(reason: String, context: &LoopContext) {
    context
        .state_tx
        .send_replace(ConnectionState::Disconnected(reason.clone()));

    // an error while shutting down is the expected end of the connection
    if !context.run.is_running() {
        debug!("Connection closed during shutdown: {}", reason);
        return;
    }

    context
        .handler
        .on_disconnect(&DisconnectReason::Lost(reason.clone()));
    context
        .run
        .stop(StopReason::Fault(format!("connection lost: {reason}")));
}
