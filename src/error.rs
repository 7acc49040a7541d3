use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum AgentError {
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Broker rejected credentials: {0}")]
    BrokerAuth(String),

    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("Sensor read fault: {0}")]
    SensorRead(String),

    #[error("Publish failed on topic {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether the fault implies the broker session is gone and the
    /// connectivity supervisor must re-establish it before the next publish.
    pub fn severs_broker(&self) -> bool {
        matches!(
            self,
            AgentError::NetworkUnavailable(_)
                | AgentError::BrokerUnavailable(_)
                | AgentError::BrokerAuth(_)
                | AgentError::ConnectTimeout(_)
                | AgentError::Publish { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_faults_sever_broker() {
        assert!(AgentError::NetworkUnavailable("ap lost".into()).severs_broker());
        assert!(
            AgentError::Publish {
                topic: "gds/ky-020".into(),
                reason: "connection reset".into()
            }
            .severs_broker()
        );
        assert!(
            AgentError::ConnectTimeout(std::time::Duration::from_secs(10)).severs_broker()
        );
    }

    #[test]
    fn test_local_faults_keep_broker() {
        assert!(!AgentError::SensorRead("adc out of range".into()).severs_broker());
        assert!(!AgentError::InvalidConfig("empty client id".into()).severs_broker());
    }
}
