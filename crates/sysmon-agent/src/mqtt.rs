//! MQTT transport: publishes report fields and forwards inbound commands.

use crate::config::{AgentConfig, ConfigError};
use crate::orchestrator::{ControlEvent, ReporterHandle};
use crate::publisher::Publisher;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysmon_common::topics;
use tokio::task::JoinHandle;

/// Pending requests between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const CLOSE_GRACE: Duration = Duration::from_secs(2);
/// Longest wait for request queue capacity while connected.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub client_id: String,
    pub username: String,
    pub password: Option<String>,
    pub telemetry_prefix: String,
    pub command_prefix: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl MqttSettings {
    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        let broker = config.broker()?;
        Ok(Self {
            host: broker.host,
            port: broker.port,
            tls: broker.tls,
            client_id: format!("sysmon-{}", config.device_id),
            username: config.device_id.clone(),
            password: config.device_token.clone(),
            telemetry_prefix: config.telemetry_prefix(),
            command_prefix: config.command_prefix(),
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }
}

/// Inbound command topics and their mapping to reporter events.
#[derive(Debug, Clone)]
pub struct CommandTopics {
    trigger: String,
    interval: String,
}

impl CommandTopics {
    pub fn new(prefix: &str) -> Self {
        Self {
            trigger: format!("{prefix}/{}", topics::TRIGGER),
            interval: format!("{prefix}/{}", topics::INTERVAL),
        }
    }

    pub fn decode(&self, topic: &str, payload: &[u8]) -> Option<ControlEvent> {
        if topic == self.trigger {
            Some(ControlEvent::Trigger)
        } else if topic == self.interval {
            Some(ControlEvent::SetInterval(
                String::from_utf8_lossy(payload).into_owned(),
            ))
        } else {
            None
        }
    }

    fn subscribe_all(&self, client: &AsyncClient) -> Result<(), rumqttc::ClientError> {
        client.try_subscribe(self.trigger.as_str(), QoS::AtLeastOnce)?;
        client.try_subscribe(self.interval.as_str(), QoS::AtLeastOnce)?;
        Ok(())
    }
}

pub struct MqttPublisher {
    client: AsyncClient,
    telemetry_prefix: String,
    connected: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    /// Connects to the broker, subscribes to the command topics and starts
    /// forwarding inbound commands to `handle`.
    ///
    /// # Errors
    ///
    /// Fails if the broker cannot be reached or refuses the connection
    /// within `connect_timeout`.
    pub async fn connect(settings: MqttSettings, handle: ReporterHandle) -> Result<Self> {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        if let Some(password) = &settings.password {
            options.set_credentials(&settings.username, password);
        }
        if settings.tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        tokio::time::timeout(settings.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .with_context(|| {
                format!(
                    "Timed out connecting to MQTT broker {}:{}",
                    settings.host, settings.port
                )
            })??;
        tracing::info!(host = %settings.host, port = settings.port, tls = settings.tls, "Connected to broker");

        let commands = CommandTopics::new(&settings.command_prefix);
        commands
            .subscribe_all(&client)
            .context("Error subscribing to command topics")?;

        let connected = Arc::new(AtomicBool::new(true));
        let pump = tokio::spawn(pump_events(
            eventloop,
            client.clone(),
            commands,
            handle,
            connected.clone(),
        ));

        Ok(Self {
            client,
            telemetry_prefix: settings.telemetry_prefix,
            connected,
            pump: Mutex::new(Some(pump)),
        })
    }

    fn take_pump(&self) -> Option<JoinHandle<()>> {
        self.pump.lock().ok().and_then(|mut guard| guard.take())
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                bail!("Broker refused connection: {:?}", ack.code);
            }
            Ok(_) => {}
            Err(e) => return Err(e).context("Failed to connect to MQTT broker"),
        }
    }
}

/// Drives the MQTT connection until a disconnect has been sent.
async fn pump_events(
    mut eventloop: EventLoop,
    client: AsyncClient,
    commands: CommandTopics,
    handle: ReporterHandle,
    connected: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match commands.decode(&publish.topic, &publish.payload) {
                    Some(event) => {
                        if !handle.try_send(event) {
                            tracing::warn!(topic = %publish.topic, "Reporter unavailable, dropping command");
                        }
                    }
                    None => tracing::debug!(topic = %publish.topic, "Ignoring message on unknown topic"),
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::Relaxed);
                tracing::info!("Reconnected to broker");
                if let Err(e) = commands.subscribe_all(&client) {
                    tracing::error!(error = %e, "Error resubscribing to command topics");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("Disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::Relaxed);
                tracing::warn!(error = %e, "MQTT connection error, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, field: &str, value: &str) -> Result<()> {
        let topic = format!("{}/{field}", self.telemetry_prefix);
        let payload = value.as_bytes().to_vec();

        // While disconnected the queue is not drained, so a full queue fails
        // immediately instead of stalling the cycle.
        if !self.connected.load(Ordering::Relaxed) {
            self.client
                .try_publish(topic, QoS::AtLeastOnce, false, payload)
                .with_context(|| format!("Failed to queue {field} while disconnected"))?;
            return Ok(());
        }

        tokio::time::timeout(
            PUBLISH_TIMEOUT,
            self.client.publish(topic, QoS::AtLeastOnce, false, payload),
        )
        .await
        .with_context(|| format!("Timed out queueing {field}"))?
        .with_context(|| format!("Failed to queue {field}"))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(mut pump) = self.take_pump() else {
            return Ok(());
        };

        if let Err(e) = self.client.try_disconnect() {
            pump.abort();
            return Err(e).context("Failed to request MQTT disconnect");
        }

        match tokio::time::timeout(CLOSE_GRACE, &mut pump).await {
            Ok(_) => tracing::info!("Disconnected from broker"),
            Err(_) => {
                tracing::warn!("Broker disconnect timed out");
                pump.abort();
            }
        }
        Ok(())
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Some(pump) = self.take_pump() {
            pump.abort();
        }
    }
}
