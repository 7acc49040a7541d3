//! MQTT-backed broker capability on top of rumqttc.

use crate::capability::{BrokerLink, InboundMessage};
use crate::config::DeviceIdentity;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// One live broker session: the client handle, its polling task, and the
/// state that task maintains.
struct Session {
    client: AsyncClient,
    event_loop_task: JoinHandle<()>,
    connected: Arc<AtomicBool>,
    inbound: Arc<Mutex<VecDeque<InboundMessage>>>,
}

/// [`BrokerLink`] implementation over an MQTT broker.
///
/// Each `connect` builds a fresh client and event loop and waits for the
/// broker's ConnAck within the identity's timeout. The event loop runs as
/// a background task that only buffers inbound publishes and maintains the
/// connected flag; when the connection errors it stops, and the supervisor
/// decides when to connect again.
pub struct MqttBroker {
    session: Option<Session>,
}

impl MqttBroker {
    pub fn new() -> Self {
        Self { session: None }
    }

    fn live_session(&self) -> Option<&Session> {
        self.session
            .as_ref()
            .filter(|s| s.connected.load(Ordering::SeqCst))
    }
}

impl Default for MqttBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerLink for MqttBroker {
    async fn connect(&mut self, identity: &DeviceIdentity) -> Result<()> {
        self.disconnect().await;

        let mut options = MqttOptions::new(
            &identity.client_id,
            &identity.broker_host,
            identity.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);

        // Set credentials if provided
        if let (Some(username), Some(password)) = (&identity.username, &identity.password) {
            options.set_credentials(username, password);
        }

        let (client, mut event_loop) = AsyncClient::new(options, 100);
        let connected = Arc::new(AtomicBool::new(false));
        let inbound: Arc<Mutex<VecDeque<InboundMessage>>> = Arc::new(Mutex::new(VecDeque::new()));

        let (ack_tx, ack_rx) = oneshot::channel::<Result<()>>();
        let mut ack_tx = Some(ack_tx);
        let connected_for_task = connected.clone();
        let inbound_for_task = inbound.clone();

        let event_loop_task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => match ack.code {
                        ConnectReturnCode::Success => {
                            connected_for_task.store(true, Ordering::SeqCst);
                            if let Some(tx) = ack_tx.take() {
                                let _ = tx.send(Ok(()));
                            }
                        }
                        code => {
                            let err = match code {
                                ConnectReturnCode::BadUserNamePassword
                                | ConnectReturnCode::NotAuthorized => {
                                    AgentError::BrokerAuth(format!("{:?}", code))
                                }
                                other => {
                                    AgentError::BrokerUnavailable(format!("{:?}", other))
                                }
                            };
                            if let Some(tx) = ack_tx.take() {
                                let _ = tx.send(Err(err));
                            }
                            break;
                        }
                    },
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!("[MQTT] inbound on {}", publish.topic);
                        inbound_for_task.lock().push_back(InboundMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if let Some(tx) = ack_tx.take() {
                            let _ =
                                tx.send(Err(AgentError::BrokerUnavailable(e.to_string())));
                        } else {
                            error!("[MQTT] connection error: {}", e);
                        }
                        // The session is gone; the supervisor owns the
                        // reconnect cadence, so stop polling here.
                        connected_for_task.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        match tokio::time::timeout(identity.connect_timeout, ack_rx).await {
            Ok(Ok(Ok(()))) => {
                info!(
                    "[MQTT] connected to {}:{}",
                    identity.broker_host, identity.broker_port
                );
                self.session = Some(Session {
                    client,
                    event_loop_task,
                    connected,
                    inbound,
                });
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                event_loop_task.abort();
                Err(e)
            }
            Ok(Err(_)) => {
                event_loop_task.abort();
                Err(AgentError::BrokerUnavailable(
                    "event loop dropped before ConnAck".to_string(),
                ))
            }
            Err(_) => {
                warn!(
                    "[MQTT] no ConnAck within {:?}",
                    identity.connect_timeout
                );
                event_loop_task.abort();
                Err(AgentError::ConnectTimeout(identity.connect_timeout))
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.client.disconnect().await;
            session.event_loop_task.abort();
        }
    }

    fn is_connected(&self) -> bool {
        self.live_session().is_some()
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        let Some(session) = self.live_session() else {
            return Err(AgentError::Publish {
                topic: topic.to_string(),
                reason: "no live session".to_string(),
            });
        };
        session
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| AgentError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let Some(session) = self.live_session() else {
            return Err(AgentError::BrokerUnavailable(
                "no live session".to_string(),
            ));
        };
        info!("[MQTT] subscribing to {}", topic);
        session
            .client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| AgentError::BrokerUnavailable(e.to_string()))
    }

    fn try_recv(&mut self) -> Option<InboundMessage> {
        self.session.as_ref()?.inbound.lock().pop_front()
    }
}
