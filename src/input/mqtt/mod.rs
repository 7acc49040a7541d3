//! MQTT transport for the agent.
//!
//! Wraps rumqttc behind the [`crate::capability::BrokerLink`] contract so
//! the agent core never sees MQTT internals.

mod client;

pub use client::MqttBroker;
