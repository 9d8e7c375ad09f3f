//! MQTT broker access.

use async_trait::async_trait;
use sdm630_common::{MqttConfig, MqttSession};
use tracing::warn;

use crate::error::{ConnectionError, PublishError};

/// Opens a connection to the message broker.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    type Connection: BrokerConnection;

    async fn open(&self) -> Result<Self::Connection, ConnectionError>;
}

/// An open broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Fire-and-forget publish (QoS 0, not retained).
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    /// Disconnect. Closing twice is a no-op.
    async fn close(&mut self);
}

/// Opens MQTT sessions with a fixed client identity.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    config: MqttConfig,
}

impl MqttConnector {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    type Connection = MqttSession;

    async fn open(&self) -> Result<MqttSession, ConnectionError> {
        sdm630_common::connect(&self.config)
            .await
            .map_err(|e| ConnectionError::Broker(e.to_string()))
    }
}

#[async_trait]
impl BrokerConnection for MqttSession {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        MqttSession::publish(self, topic, payload)
            .await
            .map_err(|e| PublishError {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn close(&mut self) {
        if let Err(e) = MqttSession::close(self).await {
            warn!(error = %e, "Error disconnecting from MQTT broker");
        }
    }
}
