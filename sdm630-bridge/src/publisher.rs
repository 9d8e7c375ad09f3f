//! Measurement publisher.

use sdm630_common::{PayloadFormat, TopicBuilder, encode_payload};
use tracing::debug;

use crate::broker::BrokerConnection;
use crate::error::PublishError;

/// Maps decoded measurements to topics and payloads.
#[derive(Debug, Clone)]
pub struct Publisher {
    topics: TopicBuilder,
    format: PayloadFormat,
}

impl Publisher {
    pub fn new(topic_prefix: impl Into<String>, format: PayloadFormat) -> Self {
        Self {
            topics: TopicBuilder::new(topic_prefix),
            format,
        }
    }

    /// Topic for one measurement of one device.
    pub fn topic(&self, device: u8, measurement: &str) -> String {
        self.topics.build(device, measurement)
    }

    /// Publish one measurement over an open broker connection.
    ///
    /// Delivery is best-effort; only local client failures are returned.
    pub async fn publish<C>(
        &self,
        connection: &C,
        device: u8,
        measurement: &str,
        value: f32,
    ) -> Result<(), PublishError>
    where
        C: BrokerConnection + ?Sized,
    {
        let topic = self.topic(device, measurement);
        let payload =
            encode_payload(device, measurement, value, self.format).map_err(|e| PublishError {
                topic: topic.clone(),
                message: e.to_string(),
            })?;

        connection.publish(&topic, payload).await?;
        debug!(topic = %topic, value, "Published");
        Ok(())
    }
}
