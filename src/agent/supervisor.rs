//! Connectivity supervision for the network and broker links.

use super::backoff::Backoff;
use crate::capability::{BrokerLink, InboundMessage, NetworkLink};
use crate::config::DeviceIdentity;
use crate::error::{AgentError, Result};
use log::{debug, info, warn};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of both link states. The broker may only be connected while
/// the network is; [`ConnectivitySupervisor`] maintains that invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
    pub network: LinkStatus,
    pub broker: LinkStatus,
}

impl LinkState {
    fn down() -> Self {
        Self {
            network: LinkStatus::Disconnected,
            broker: LinkStatus::Disconnected,
        }
    }
}

/// Owns both links and their state machine. All transitions happen through
/// explicit calls here or their failures; there is no background watcher.
pub struct ConnectivitySupervisor {
    network: Box<dyn NetworkLink>,
    broker: Box<dyn BrokerLink>,
    state: LinkState,
    retry: Backoff,
    /// Association attempts per `ensure_network` call. 0 retries forever.
    max_network_attempts: u32,
}

impl ConnectivitySupervisor {
    pub fn new(
        network: Box<dyn NetworkLink>,
        broker: Box<dyn BrokerLink>,
        retry: Backoff,
        max_network_attempts: u32,
    ) -> Self {
        Self {
            network,
            broker,
            state: LinkState::down(),
            retry,
            max_network_attempts,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Side-effect-free readiness gate for the publish path.
    pub fn is_ready(&self) -> bool {
        self.state.network == LinkStatus::Connected && self.state.broker == LinkStatus::Connected
    }

    /// Reconcile tracked state with what the capabilities report. Network
    /// loss always demotes the broker too.
    pub fn refresh(&mut self) {
        if self.state.network == LinkStatus::Connected && !self.network.is_connected() {
            warn!("[Link] network association lost");
            self.state = LinkState::down();
        }
        if self.state.broker == LinkStatus::Connected && !self.broker.is_connected() {
            warn!("[Link] broker session lost");
            self.state.broker = LinkStatus::Disconnected;
        }
    }

    /// Drive the network link to connected, retrying with backoff up to the
    /// configured attempt budget.
    pub async fn ensure_network(&mut self) -> Result<()> {
        if self.state.network == LinkStatus::Connected && self.network.is_connected() {
            return Ok(());
        }
        self.state = LinkState {
            network: LinkStatus::Connecting,
            broker: LinkStatus::Disconnected,
        };

        let mut attempt = 0u32;
        loop {
            match self.network.connect().await {
                Ok(()) => {
                    self.state.network = LinkStatus::Connected;
                    match self.network.local_addr() {
                        Some(addr) => info!("[Link] network associated, address {}", addr),
                        None => info!("[Link] network associated"),
                    }
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if self.max_network_attempts > 0 && attempt >= self.max_network_attempts {
                        self.state.network = LinkStatus::Disconnected;
                        warn!(
                            "[Link] giving up network association after {} attempts: {}",
                            attempt, e
                        );
                        return Err(e);
                    }
                    let delay = self.retry.delay_for(attempt - 1);
                    debug!(
                        "[Link] association attempt {} failed ({}), retrying in {:?}",
                        attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One broker connect attempt. Retry cadence belongs to the caller.
    pub async fn ensure_broker(&mut self, identity: &DeviceIdentity) -> Result<()> {
        if self.state.network != LinkStatus::Connected {
            return Err(AgentError::NetworkUnavailable(
                "cannot reach broker without network".to_string(),
            ));
        }
        if self.state.broker == LinkStatus::Connected && self.broker.is_connected() {
            return Ok(());
        }

        self.state.broker = LinkStatus::Connecting;
        match self.broker.connect(identity).await {
            Ok(()) => {
                self.state.broker = LinkStatus::Connected;
                info!(
                    "[Link] broker session established at {}:{} as {}",
                    identity.broker_host, identity.broker_port, identity.client_id
                );
                Ok(())
            }
            Err(e) => {
                self.state.broker = LinkStatus::Disconnected;
                Err(e)
            }
        }
    }

    /// Drop the broker session so the next iteration re-establishes it.
    pub async fn drop_broker(&mut self) {
        self.broker.disconnect().await;
        self.state.broker = LinkStatus::Disconnected;
    }

    /// Tear down both links for a full reconnect.
    pub async fn reset_links(&mut self) {
        self.broker.disconnect().await;
        self.state = LinkState::down();
    }

    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        if !self.is_ready() {
            return Err(AgentError::Publish {
                topic: topic.to_string(),
                reason: "links not ready".to_string(),
            });
        }
        self.broker.publish(topic, payload).await
    }

    pub async fn subscribe(&mut self, topic: &str) -> Result<()> {
        if self.state.broker != LinkStatus::Connected {
            return Err(AgentError::BrokerUnavailable(
                "cannot subscribe without a broker session".to_string(),
            ));
        }
        self.broker.subscribe(topic).await
    }

    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        self.broker.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::input::simulation::broker::SimulatedBroker;
    use crate::input::simulation::network::SimulatedNetwork;
    use std::time::Duration;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::from_config(&Config::default().mqtt).unwrap()
    }

    fn fast_retry() -> Backoff {
        Backoff::fixed(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_links_come_up_in_order() {
        let (network, _net_handle) = SimulatedNetwork::new();
        let (broker, _broker_handle) = SimulatedBroker::new();
        let mut supervisor =
            ConnectivitySupervisor::new(Box::new(network), Box::new(broker), fast_retry(), 3);

        assert!(!supervisor.is_ready());
        supervisor.ensure_network().await.unwrap();
        assert_eq!(supervisor.state().network, LinkStatus::Connected);
        assert!(!supervisor.is_ready());

        supervisor.ensure_broker(&identity()).await.unwrap();
        assert!(supervisor.is_ready());
    }

    #[tokio::test]
    async fn test_broker_requires_network() {
        let (network, _net_handle) = SimulatedNetwork::new();
        let (broker, _broker_handle) = SimulatedBroker::new();
        let mut supervisor =
            ConnectivitySupervisor::new(Box::new(network), Box::new(broker), fast_retry(), 3);

        let err = supervisor.ensure_broker(&identity()).await.unwrap_err();
        assert!(matches!(err, AgentError::NetworkUnavailable(_)));
    }

    #[tokio::test]
    async fn test_bounded_association_surfaces_failure() {
        let (network, net_handle) = SimulatedNetwork::new();
        net_handle.fail_next_connects(10);
        let (broker, _broker_handle) = SimulatedBroker::new();
        let mut supervisor =
            ConnectivitySupervisor::new(Box::new(network), Box::new(broker), fast_retry(), 3);

        let err = supervisor.ensure_network().await.unwrap_err();
        assert!(matches!(err, AgentError::NetworkUnavailable(_)));
        assert_eq!(supervisor.state().network, LinkStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_association_retries_within_budget() {
        let (network, net_handle) = SimulatedNetwork::new();
        net_handle.fail_next_connects(2);
        let (broker, _broker_handle) = SimulatedBroker::new();
        let mut supervisor =
            ConnectivitySupervisor::new(Box::new(network), Box::new(broker), fast_retry(), 5);

        supervisor.ensure_network().await.unwrap();
        assert_eq!(supervisor.state().network, LinkStatus::Connected);
    }

    #[tokio::test]
    async fn test_network_loss_forces_broker_down() {
        let (network, net_handle) = SimulatedNetwork::new();
        let (broker, _broker_handle) = SimulatedBroker::new();
        let mut supervisor =
            ConnectivitySupervisor::new(Box::new(network), Box::new(broker), fast_retry(), 3);

        supervisor.ensure_network().await.unwrap();
        supervisor.ensure_broker(&identity()).await.unwrap();
        assert!(supervisor.is_ready());

        net_handle.drop_link();
        supervisor.refresh();
        assert_eq!(supervisor.state().network, LinkStatus::Disconnected);
        assert_eq!(supervisor.state().broker, LinkStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_publish_gated_on_readiness() {
        let (network, _net_handle) = SimulatedNetwork::new();
        let (broker, _broker_handle) = SimulatedBroker::new();
        let mut supervisor =
            ConnectivitySupervisor::new(Box::new(network), Box::new(broker), fast_retry(), 3);

        let err = supervisor.publish("gds0653/ky-020", b"1").await.unwrap_err();
        assert!(matches!(err, AgentError::Publish { .. }));
    }
}
