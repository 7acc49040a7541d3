//! Simulated wireless link with scriptable faults.

use crate::capability::NetworkLink;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

#[derive(Default)]
struct NetworkScript {
    connected: bool,
    fail_connects: u32,
    connects: u32,
}

/// Test/demo handle scripting a [`SimulatedNetwork`].
#[derive(Clone)]
pub struct NetworkScriptHandle {
    script: Arc<Mutex<NetworkScript>>,
}

impl NetworkScriptHandle {
    /// Make the next `n` association attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.script.lock().fail_connects = n;
    }

    /// Drop the link, as if the access point went away.
    pub fn drop_link(&self) {
        self.script.lock().connected = false;
    }

    /// Successful associations so far.
    pub fn connect_count(&self) -> u32 {
        self.script.lock().connects
    }
}

/// In-memory stand-in for the wireless capability.
pub struct SimulatedNetwork {
    script: Arc<Mutex<NetworkScript>>,
}

impl SimulatedNetwork {
    pub fn new() -> (Self, NetworkScriptHandle) {
        let script = Arc::new(Mutex::new(NetworkScript::default()));
        (
            Self {
                script: script.clone(),
            },
            NetworkScriptHandle { script },
        )
    }
}

#[async_trait]
impl NetworkLink for SimulatedNetwork {
    async fn connect(&mut self) -> Result<()> {
        let mut script = self.script.lock();
        if script.fail_connects > 0 {
            script.fail_connects -= 1;
            return Err(AgentError::NetworkUnavailable(
                "association rejected".to_string(),
            ));
        }
        script.connected = true;
        script.connects += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.script.lock().connected
    }

    fn local_addr(&self) -> Option<IpAddr> {
        if self.is_connected() {
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)))
        } else {
            None
        }
    }
}
