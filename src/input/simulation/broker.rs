//! Recording broker stub with scriptable faults.
//!
//! Records every publish for assertions, counts established sessions, and
//! lets tests inject inbound messages and connect/publish failures.

use crate::capability::{BrokerLink, InboundMessage};
use crate::config::DeviceIdentity;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
struct BrokerScript {
    connected: bool,
    sessions: u32,
    fail_connects: u32,
    fail_publishes: u32,
    published: Vec<(String, Vec<u8>)>,
    subscriptions: Vec<String>,
    inbound: VecDeque<InboundMessage>,
}

/// Test/demo handle scripting a [`SimulatedBroker`].
#[derive(Clone)]
pub struct BrokerScriptHandle {
    script: Arc<Mutex<BrokerScript>>,
}

impl BrokerScriptHandle {
    pub fn fail_next_connects(&self, n: u32) {
        self.script.lock().fail_connects = n;
    }

    pub fn fail_next_publishes(&self, n: u32) {
        self.script.lock().fail_publishes = n;
    }

    /// Kill the live session, as the broker closing the TCP stream would.
    pub fn drop_session(&self) {
        self.script.lock().connected = false;
    }

    /// Sessions successfully established so far.
    pub fn session_count(&self) -> u32 {
        self.script.lock().sessions
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.script.lock().published.clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.script
            .lock()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.script.lock().subscriptions.clone()
    }

    /// Queue an inbound message for the agent's next poll.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        self.script.lock().inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }
}

/// In-memory stand-in for the broker capability.
pub struct SimulatedBroker {
    script: Arc<Mutex<BrokerScript>>,
}

impl SimulatedBroker {
    pub fn new() -> (Self, BrokerScriptHandle) {
        let script = Arc::new(Mutex::new(BrokerScript::default()));
        (
            Self {
                script: script.clone(),
            },
            BrokerScriptHandle { script },
        )
    }
}

#[async_trait]
impl BrokerLink for SimulatedBroker {
    async fn connect(&mut self, _identity: &DeviceIdentity) -> Result<()> {
        let mut script = self.script.lock();
        if script.fail_connects > 0 {
            script.fail_connects -= 1;
            return Err(AgentError::BrokerUnavailable(
                "connection refused".to_string(),
            ));
        }
        script.connected = true;
        script.sessions += 1;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.script.lock().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.script.lock().connected
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        let mut script = self.script.lock();
        if !script.connected {
            return Err(AgentError::Publish {
                topic: topic.to_string(),
                reason: "no session".to_string(),
            });
        }
        if script.fail_publishes > 0 {
            script.fail_publishes -= 1;
            return Err(AgentError::Publish {
                topic: topic.to_string(),
                reason: "write failed".to_string(),
            });
        }
        script.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let mut script = self.script.lock();
        if !script.connected {
            return Err(AgentError::BrokerUnavailable("no session".to_string()));
        }
        script.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<InboundMessage> {
        let mut script = self.script.lock();
        if !script.connected {
            return None;
        }
        script.inbound.pop_front()
    }
}
