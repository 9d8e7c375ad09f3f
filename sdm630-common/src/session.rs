use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::error::{Error, Result};

/// Capacity of the request channel between the client handle and its event loop.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// How long `close` waits for queued packets to drain before aborting the event loop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Build the `rumqttc` options for a broker configuration.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    } else if let Some(username) = &config.username {
        options.set_credentials(username, "");
    }

    options
}

/// An open connection to the MQTT broker.
///
/// The `rumqttc` event loop is driven by a background task for as long as the
/// session is open. Publishing only enqueues packets; [`MqttSession::close`]
/// flushes the queue, sends DISCONNECT and stops the event loop.
pub struct MqttSession {
    client: AsyncClient,
    driver: Option<JoinHandle<()>>,
}

/// Connect to the MQTT broker and wait for its CONNACK.
pub async fn connect(config: &MqttConfig) -> Result<MqttSession> {
    tracing::info!(
        host = %config.host,
        port = config.port,
        client_id = %config.client_id,
        "Connecting to MQTT broker"
    );

    let (client, mut eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CHANNEL_CAPACITY);

    match tokio::time::timeout(config.connect_timeout(), wait_for_connack(&mut eventloop)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(Error::MqttConnection(format!(
                "no CONNACK from {}:{} within {}ms",
                config.host, config.port, config.connect_timeout_ms
            )));
        }
    }

    tracing::info!(host = %config.host, "Connected to MQTT broker");

    let driver = tokio::spawn(drive(eventloop));

    Ok(MqttSession {
        client,
        driver: Some(driver),
    })
}

async fn wait_for_connack(
    eventloop: &mut EventLoop,
) -> std::result::Result<(), rumqttc::ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(ack)) = eventloop.poll().await? {
            tracing::debug!(code = ?ack.code, "Received CONNACK");
            return Ok(());
        }
    }
}

async fn drive(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT DISCONNECT sent");
                break;
            }
            Ok(event) => {
                tracing::trace!(?event, "MQTT event");
            }
            Err(e) => {
                // No reconnect: the next poll cycle opens a fresh session.
                tracing::warn!(error = %e, "MQTT event loop stopped");
                break;
            }
        }
    }
}

impl MqttSession {
    /// Whether the session is still usable for publishing.
    pub fn is_open(&self) -> bool {
        self.driver.as_ref().is_some_and(|d| !d.is_finished())
    }

    /// Publish `payload` to `topic` with QoS 0, not retained.
    ///
    /// Only local failures are reported; the broker never acknowledges QoS 0.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if !self.is_open() {
            return Err(Error::MqttConnection(
                "session is not connected".to_string(),
            ));
        }
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    /// Disconnect from the broker. Calling this on a closed session is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut driver) = self.driver.take() else {
            return Ok(());
        };

        let result = if driver.is_finished() {
            Ok(())
        } else {
            self.client.disconnect().await.map_err(Error::from)
        };

        if tokio::time::timeout(DRAIN_TIMEOUT, &mut driver).await.is_err() {
            tracing::warn!("MQTT event loop did not stop in time, aborting");
            driver.abort();
        }

        tracing::info!("Disconnected from MQTT broker");
        result
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}
