//! Pure routing of rumqttc events and publish acknowledgement tracking

use super::connection::connack_code;
use crate::transport::ReceivedMessage;
use rumqttc::{Event, Outgoing, Packet, SubscribeReasonCode};
use tracing::debug;

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRoute {
    /// CONNACK with its return code
    ConnectionAcknowledged(u8),
    /// Message received on a subscribed topic
    MessageReceived(ReceivedMessage),
    /// PUBACK for the given packet id
    PublishAcknowledged(u16),
    /// SUBACK with granted QoS per filter, `None` for rejected filters
    SubscriptionAcknowledged { mid: u16, granted: Vec<Option<u8>> },
    /// Broker sent DISCONNECT
    Disconnected,
    /// Library assigned this packet id to our publish
    PublishSent(u16),
    /// Our DISCONNECT was written
    DisconnectSent,
    /// Anything else (pings, other acks)
    Infrastructure,
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route a rumqttc event to the action the client should take
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(packet) => match packet {
                Packet::ConnAck(connack) => {
                    EventRoute::ConnectionAcknowledged(connack_code(connack.code))
                }
                Packet::Publish(publish) => EventRoute::MessageReceived(ReceivedMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    qos: publish.qos as u8,
                    retain: publish.retain,
                }),
                Packet::PubAck(puback) => EventRoute::PublishAcknowledged(puback.pkid),
                Packet::SubAck(suback) => EventRoute::SubscriptionAcknowledged {
                    mid: suback.pkid,
                    granted: suback
                        .return_codes
                        .iter()
                        .map(|code| match code {
                            SubscribeReasonCode::Success(qos) => Some(*qos as u8),
                            SubscribeReasonCode::Failure => None,
                        })
                        .collect(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => {
                    debug!(target: "mqtt_transport", "MQTT event: {:?}", other);
                    EventRoute::Infrastructure
                }
            },
            Event::Outgoing(Outgoing::Publish(pkid)) => EventRoute::PublishSent(*pkid),
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::Infrastructure,
        }
    }

    /// Validate granted QoS list from a SUBACK
    pub fn validate_subscription_success(granted: &[Option<u8>]) -> Result<(), String> {
        if granted.iter().any(Option::is_none) {
            Err(format!(
                "broker rejected subscription, granted: {granted:?}"
            ))
        } else {
            Ok(())
        }
    }
}

/// Result of matching a PUBACK against the recorded publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Acknowledgement for the publish this client sent
    Expected(u16),
    /// Acknowledgement for a different id
    Unexpected { got: u16, expected: Option<u16> },
}

/// Correlates the packet id of our publish with its acknowledgement
#[derive(Debug, Default)]
pub struct PublishTracker {
    sent: Option<u16>,
}

impl PublishTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self, mid: u16) {
        self.sent = Some(mid);
    }

    pub fn sent(&self) -> Option<u16> {
        self.sent
    }

    pub fn acknowledge(&mut self, mid: u16) -> AckOutcome {
        match self.sent {
            Some(expected) if expected == mid => {
                self.sent = None;
                AckOutcome::Expected(mid)
            }
            expected => AckOutcome::Unexpected { got: mid, expected },
        }
    }
}
