//! Message broker capability.

use crate::config::DeviceIdentity;
use crate::error::Result;
use async_trait::async_trait;

/// Message received from the broker on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// The broker-side transport. One implementation wraps a real MQTT client
/// ([`crate::input::mqtt::MqttBroker`]); tests use a recording mock.
///
/// `connect` makes exactly one attempt and reports typed failures; retry
/// cadence is the connectivity supervisor's decision, never the link's.
#[async_trait]
pub trait BrokerLink: Send {
    /// One connect attempt against the configured broker.
    async fn connect(&mut self, identity: &DeviceIdentity) -> Result<()>;

    /// Tear down the session, dropping any in-flight state.
    async fn disconnect(&mut self);

    /// Whether a live session is currently established.
    fn is_connected(&self) -> bool;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()>;

    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Non-blocking poll for one inbound message, if any arrived since the
    /// last call.
    fn try_recv(&mut self) -> Option<InboundMessage>;
}
