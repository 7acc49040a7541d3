//! The sensor agent runtime.
//!
//! One agent owns one sensor, its sampling policy, and both links. The
//! loop is a single logical thread of control: every iteration checks
//! readiness, services inbound messages, samples, decides and publishes,
//! and the fault handler wraps the whole iteration so no recoverable
//! failure ever terminates the process.

pub mod backoff;
pub mod publisher;
pub mod sampling;
pub mod supervisor;

pub use backoff::Backoff;
pub use publisher::{PayloadFormat, PublishEvent, PublishReason, Publisher};
pub use sampling::{Decision, SamplingEngine, SamplingPolicy};
pub use supervisor::{ConnectivitySupervisor, LinkState, LinkStatus};

use crate::config::{DeviceIdentity, FaultConfig};
use crate::error::{AgentError, Result};
use crate::sensors::Sensor;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

pub struct Agent {
    identity: DeviceIdentity,
    supervisor: ConnectivitySupervisor,
    engine: SamplingEngine,
    publisher: Publisher,
    sensor: Box<dyn Sensor>,
    recovery: Backoff,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    warmed_up: bool,
}

impl Agent {
    pub fn new(
        identity: DeviceIdentity,
        supervisor: ConnectivitySupervisor,
        engine: SamplingEngine,
        publisher: Publisher,
        sensor: Box<dyn Sensor>,
        fault: &FaultConfig,
    ) -> Self {
        Self {
            identity,
            supervisor,
            engine,
            publisher,
            sensor,
            recovery: Backoff {
                initial: Duration::from_millis(fault.backoff_initial_ms),
                max: Duration::from_millis(fault.backoff_max_ms),
                factor: fault.backoff_factor,
            },
            max_consecutive_failures: fault.max_consecutive_failures,
            consecutive_failures: 0,
            warmed_up: false,
        }
    }

    /// Run until the process ends. Recoverable faults are absorbed by the
    /// fault handler; only the caller (signal handling) stops the loop.
    pub async fn run(mut self) -> Result<()> {
        let name = self.sensor.descriptor().name.clone();
        info!(
            "[{}] agent starting, publishing to {}",
            name,
            self.publisher.topic()
        );

        self.warm_up_once().await;

        let tick = self.engine.policy().tick_interval;
        loop {
            match self.iteration().await {
                Ok(()) => self.consecutive_failures = 0,
                Err(e) => self.recover(e).await,
            }
            tokio::time::sleep(tick).await;
        }
    }

    /// Stabilization delay for sensing elements that need it. Applied once
    /// per process, never on reconnects.
    async fn warm_up_once(&mut self) {
        if self.warmed_up {
            return;
        }
        self.warmed_up = true;
        if let Some(warm_up) = self.engine.policy().warm_up {
            info!(
                "[{}] warming up for {:?} before first sample",
                self.sensor.descriptor().name,
                warm_up
            );
            tokio::time::sleep(warm_up).await;
        }
    }

    /// One pass of {readiness gate, inbound service, sample, decide,
    /// publish}. Any error is handled by [`Agent::recover`].
    async fn iteration(&mut self) -> Result<()> {
        self.supervisor.refresh();
        if !self.supervisor.is_ready() {
            self.supervisor.ensure_network().await?;
            self.supervisor.ensure_broker(&self.identity).await?;
            // Re-subscribe on every fresh session.
            if let Some(topic) = self.identity.subscribe_topic.clone() {
                self.supervisor.subscribe(&topic).await?;
            }
        }

        while let Some(message) = self.supervisor.try_recv() {
            self.sensor.handle_command(&message);
        }

        let now = Instant::now();
        let reading = match self.sensor.sample(now) {
            Ok(reading) => reading,
            Err(AgentError::SensorRead(reason)) => {
                // Implausible read: no event this tick, not a failure.
                debug!(
                    "[{}] sensor read fault: {}",
                    self.sensor.descriptor().name,
                    reason
                );
                None
            }
            Err(e) => return Err(e),
        };

        match self.engine.observe(reading.as_ref(), now) {
            Decision::Report { reason, reading } => {
                let event = self.publisher.make_event(&reading, reason)?;
                self.supervisor.publish(&event.topic, &event.payload).await?;
                self.publisher.commit_sent();
                self.engine.commit(&reading, reason, now);
                info!(
                    "[{}] #{} published {} ({})",
                    self.sensor.descriptor().name,
                    self.publisher.sequence(),
                    reading.label,
                    reason
                );
            }
            Decision::Suppress => {}
        }

        Ok(())
    }

    /// Fault boundary: log, sever the broker handle where warranted, back
    /// off, and escalate to a full link reset after too many consecutive
    /// failures.
    async fn recover(&mut self, error: AgentError) {
        self.consecutive_failures += 1;
        warn!(
            "[{}] iteration failed ({} consecutive): {}",
            self.sensor.descriptor().name,
            self.consecutive_failures,
            error
        );

        if error.severs_broker() {
            self.supervisor.drop_broker().await;
        }

        if self.max_consecutive_failures > 0
            && self.consecutive_failures >= self.max_consecutive_failures
        {
            warn!(
                "[{}] {} consecutive failures, forcing full reconnect",
                self.sensor.descriptor().name,
                self.consecutive_failures
            );
            self.supervisor.reset_links().await;
            self.consecutive_failures = 0;
        }

        let delay = self
            .recovery
            .delay_for(self.consecutive_failures.saturating_sub(1));
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::InboundMessage;
    use crate::config::Config;
    use crate::input::simulation::broker::{BrokerScriptHandle, SimulatedBroker};
    use crate::input::simulation::network::{NetworkScriptHandle, SimulatedNetwork};
    use crate::input::simulation::pins::SimulatedDigitalPin;
    use crate::sensors::{DigitalSensor, Polarity, SensorClass, SensorDescriptor, SensorReading};

    fn test_fault_config() -> FaultConfig {
        FaultConfig {
            max_consecutive_failures: 3,
            backoff_initial_ms: 1,
            backoff_max_ms: 2,
            backoff_factor: 1.0,
        }
    }

    fn test_policy() -> SamplingPolicy {
        SamplingPolicy {
            tick_interval: Duration::from_millis(1),
            debounce: Duration::ZERO,
            change_threshold: 0.0,
            heartbeat: None,
            warm_up: None,
        }
    }

    struct Rig {
        agent: Agent,
        net: NetworkScriptHandle,
        broker: BrokerScriptHandle,
        pin: crate::input::simulation::pins::DigitalHandle,
    }

    fn rig() -> Rig {
        let mut config = Config::default();
        config.mqtt.publish_topic = "gds0653/ky-020".to_string();
        let identity = DeviceIdentity::from_config(&config.mqtt).unwrap();

        let (network, net) = SimulatedNetwork::new();
        let (broker, broker_handle) = SimulatedBroker::new();
        let supervisor = ConnectivitySupervisor::new(
            Box::new(network),
            Box::new(broker),
            Backoff::fixed(Duration::from_millis(1)),
            3,
        );

        let (pin, pin_handle) = SimulatedDigitalPin::new(false);
        let sensor = DigitalSensor::new(
            "inclinacion",
            Box::new(pin),
            Polarity::ActiveHigh,
            "inclinado",
            "vertical",
        );

        let agent = Agent::new(
            identity,
            supervisor,
            SamplingEngine::new(test_policy()).unwrap(),
            Publisher::new("inclinacion", "gds0653/ky-020", PayloadFormat::Structured),
            Box::new(sensor),
            &test_fault_config(),
        );

        Rig {
            agent,
            net,
            broker: broker_handle,
            pin: pin_handle,
        }
    }

    #[tokio::test]
    async fn test_first_sample_always_published() {
        let mut rig = rig();
        rig.agent.iteration().await.unwrap();

        let published = rig.broker.published_on("gds0653/ky-020");
        assert_eq!(published.len(), 1);
        let record: serde_json::Value = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(record["estado"], "vertical");
        assert_eq!(record["contador"], 1);
    }

    #[tokio::test]
    async fn test_stable_value_publishes_once() {
        let mut rig = rig();
        for _ in 0..10 {
            rig.agent.iteration().await.unwrap();
        }
        assert_eq!(rig.broker.published_on("gds0653/ky-020").len(), 1);
    }

    #[tokio::test]
    async fn test_value_change_publishes_again() {
        let mut rig = rig();
        rig.agent.iteration().await.unwrap();
        rig.pin.set(true);
        rig.agent.iteration().await.unwrap();

        let published = rig.broker.published_on("gds0653/ky-020");
        assert_eq!(published.len(), 2);
        let record: serde_json::Value = serde_json::from_slice(&published[1]).unwrap();
        assert_eq!(record["estado"], "inclinado");
        assert_eq!(record["valor"], 1);
    }

    #[tokio::test]
    async fn test_reconnect_establishes_one_new_session_without_initial_replay() {
        let mut rig = rig();
        for _ in 0..3 {
            rig.agent.iteration().await.unwrap();
        }
        assert_eq!(rig.broker.session_count(), 1);

        // The access point goes away; the broker session dies with it.
        rig.net.drop_link();
        rig.broker.drop_session();

        for _ in 0..3 {
            rig.agent.iteration().await.unwrap();
        }

        // Exactly one re-established session, and the stable value is not
        // re-announced: the initial state was published once at true start.
        assert_eq!(rig.broker.session_count(), 2);
        assert_eq!(rig.broker.published_on("gds0653/ky-020").len(), 1);
    }

    #[tokio::test]
    async fn test_publishing_resumes_after_recovery() {
        let mut rig = rig();
        rig.agent.iteration().await.unwrap();

        rig.net.drop_link();
        rig.broker.drop_session();
        rig.agent.iteration().await.unwrap();

        rig.pin.set(true);
        rig.agent.iteration().await.unwrap();
        let published = rig.broker.published_on("gds0653/ky-020");
        assert_eq!(published.len(), 2);
        let record: serde_json::Value = serde_json::from_slice(&published[1]).unwrap();
        assert_eq!(record["estado"], "inclinado");
    }

    #[tokio::test]
    async fn test_failed_publish_retries_same_event() {
        let mut rig = rig();
        rig.broker.fail_next_publishes(1);

        let err = rig.agent.iteration().await.unwrap_err();
        assert!(matches!(err, AgentError::Publish { .. }));
        assert!(rig.broker.published_on("gds0653/ky-020").is_empty());

        // Broker session survived the write fault in this scenario; the
        // next tick re-derives and sends the same event, same counter.
        rig.agent.iteration().await.unwrap();
        let published = rig.broker.published_on("gds0653/ky-020");
        assert_eq!(published.len(), 1);
        let record: serde_json::Value = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(record["contador"], 1);
    }

    #[tokio::test]
    async fn test_consecutive_failures_force_full_reset() {
        let mut rig = rig();
        rig.agent.iteration().await.unwrap();
        rig.broker.fail_next_publishes(10);
        rig.pin.set(true);

        for _ in 0..3 {
            if let Err(e) = rig.agent.iteration().await {
                rig.agent.recover(e).await;
            }
        }

        assert_eq!(rig.agent.consecutive_failures, 0);
        let state = rig.agent.supervisor.state();
        assert_eq!(state.network, LinkStatus::Disconnected);
        assert_eq!(state.broker, LinkStatus::Disconnected);
    }

    struct CommandRecorder {
        descriptor: SensorDescriptor,
        commands: std::sync::Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl Sensor for CommandRecorder {
        fn descriptor(&self) -> &SensorDescriptor {
            &self.descriptor
        }

        fn sample(&mut self, _now: Instant) -> Result<Option<SensorReading>> {
            Ok(None)
        }

        fn handle_command(&mut self, message: &InboundMessage) {
            self.commands
                .lock()
                .push(String::from_utf8_lossy(&message.payload).to_string());
        }
    }

    #[tokio::test]
    async fn test_inbound_messages_reach_the_sensor() {
        let mut config = Config::default();
        config.mqtt.subscribe_topic = Some("gds0643/ky-016".to_string());
        let identity = DeviceIdentity::from_config(&config.mqtt).unwrap();

        let (network, _net) = SimulatedNetwork::new();
        let (broker, broker_handle) = SimulatedBroker::new();
        let supervisor = ConnectivitySupervisor::new(
            Box::new(network),
            Box::new(broker),
            Backoff::fixed(Duration::from_millis(1)),
            3,
        );

        let commands = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut agent = Agent::new(
            identity,
            supervisor,
            SamplingEngine::new(test_policy()).unwrap(),
            Publisher::new("led_rgb", "gds0643/ky-016", PayloadFormat::Structured),
            Box::new(CommandRecorder {
                descriptor: SensorDescriptor::new("led_rgb", SensorClass::RgbLed),
                commands: commands.clone(),
            }),
            &test_fault_config(),
        );

        // First iteration connects and subscribes.
        agent.iteration().await.unwrap();
        assert_eq!(broker_handle.subscriptions(), vec!["gds0643/ky-016"]);

        broker_handle.inject("gds0643/ky-016", br#"{"color":"rojo"}"#);
        broker_handle.inject("gds0643/ky-016", br#"{"r":1,"g":2,"b":3}"#);
        agent.iteration().await.unwrap();

        let received = commands.lock().clone();
        assert_eq!(
            received,
            vec![
                r#"{"color":"rojo"}"#.to_string(),
                r#"{"r":1,"g":2,"b":3}"#.to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_warm_up_applies_once() {
        let mut rig = rig();
        rig.agent.engine = SamplingEngine::new(SamplingPolicy {
            warm_up: Some(Duration::from_millis(5)),
            ..test_policy()
        })
        .unwrap();

        let started = Instant::now();
        rig.agent.warm_up_once().await;
        assert!(started.elapsed() >= Duration::from_millis(5));

        let started = Instant::now();
        rig.agent.warm_up_once().await;
        assert!(started.elapsed() < Duration::from_millis(5));
    }
}
