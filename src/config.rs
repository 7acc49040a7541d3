use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if (value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\''))
            {
                value = &value[1..value.len() - 1];
            }

            // Only set if not already set (env vars take precedence)
            if std::env::var(key).is_err() {
                // SAFETY: We're single-threaded at this point (called before any async runtime)
                unsafe { std::env::set_var(key, value) };
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub mqtt: MqttConfig,
    pub fault: FaultConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
    /// Per-attempt association timeout.
    pub connect_timeout_secs: u64,
    /// Bounded retry budget for one `ensure_network` call. 0 = retry forever.
    pub max_connect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publish_topic: String,
    pub subscribe_topic: Option<String>,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Consecutive iteration failures before both links are torn down
    /// and re-established from scratch.
    pub max_consecutive_failures: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                ssid: "Red-Peter".to_string(),
                password: "12345678".to_string(),
                connect_timeout_secs: 10,
                max_connect_attempts: 8,
            },
            mqtt: MqttConfig {
                broker_host: "broker.emqx.io".to_string(),
                broker_port: 1883,
                client_id: "sensor-bridge".to_string(),
                username: None,
                password: None,
                publish_topic: "gds0653/sensor".to_string(),
                subscribe_topic: None,
                connect_timeout_secs: 10,
            },
            fault: FaultConfig {
                max_consecutive_failures: 10,
                backoff_initial_ms: 500,
                backoff_max_ms: 30_000,
                backoff_factor: 2.0,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ssid) = std::env::var("WIFI_SSID") {
            config.network.ssid = ssid;
        }
        if let Ok(password) = std::env::var("WIFI_PASSWORD") {
            config.network.password = password;
        }
        if let Ok(timeout) = std::env::var("WIFI_CONNECT_TIMEOUT_SECS")
            && let Ok(t) = timeout.parse()
        {
            config.network.connect_timeout_secs = t;
        }
        if let Ok(attempts) = std::env::var("WIFI_MAX_CONNECT_ATTEMPTS")
            && let Ok(a) = attempts.parse()
        {
            config.network.max_connect_attempts = a;
        }

        // MQTT configuration
        if let Ok(host) = std::env::var("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Ok(port) = std::env::var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.mqtt.broker_port = p;
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Ok(username) = std::env::var("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Ok(topic) = std::env::var("MQTT_PUBLISH_TOPIC") {
            config.mqtt.publish_topic = topic;
        }
        if let Ok(topic) = std::env::var("MQTT_SUBSCRIBE_TOPIC") {
            config.mqtt.subscribe_topic = Some(topic);
        }

        // Fault handling
        if let Ok(max) = std::env::var("MAX_CONSECUTIVE_FAILURES")
            && let Ok(m) = max.parse()
        {
            config.fault.max_consecutive_failures = m;
        }

        config
    }
}

/// Fixed per-deployment identity of one agent. Built once at startup from
/// [`Config`], never mutated afterwards.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub client_id: String,
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publish_topic: String,
    pub subscribe_topic: Option<String>,
    pub connect_timeout: Duration,
}

impl DeviceIdentity {
    pub fn from_config(mqtt: &MqttConfig) -> Result<Self> {
        if mqtt.client_id.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "MQTT client id must not be empty".to_string(),
            ));
        }
        if mqtt.publish_topic.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "publish topic must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client_id: mqtt.client_id.clone(),
            broker_host: mqtt.broker_host.clone(),
            broker_port: mqtt.broker_port,
            username: mqtt.username.clone(),
            password: mqtt.password.clone(),
            publish_topic: mqtt.publish_topic.clone(),
            subscribe_topic: mqtt.subscribe_topic.clone(),
            connect_timeout: Duration::from_secs(mqtt.connect_timeout_secs),
        })
    }
}
