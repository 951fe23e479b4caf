use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{self, BrokerTransport, MqttConfig};
use super::message::MQTTMessage;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const MAX_ERROR_MESSAGES: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("MQTT broker not configured")]
    NotConfigured,

    #[error("Unsupported broker scheme '{0}', expected mqtt, mqtts, ws or wss")]
    UnsupportedScheme(String),

    #[error("Invalid broker url: {0}")]
    InvalidBrokerUrl(String),

    #[error("Client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    NotConfigured,
    Connecting,
    Connected,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct MQTTStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

impl MQTTStatus {
    /// One-line description for the status bar
    pub fn summary(&self) -> String {
        match self.connection_state {
            ConnectionState::Disconnected => "MQTT disconnected".to_string(),
            ConnectionState::NotConfigured => MqttError::NotConfigured.to_string(),
            ConnectionState::Connecting => "MQTT connecting".to_string(),
            ConnectionState::Connected => {
                format!("MQTT connected ({} messages)", self.messages_received)
            }
            ConnectionState::Failed => match self.error_messages.last() {
                Some(e) => format!("MQTT error: {}", e),
                None => "MQTT error".to_string(),
            },
        }
    }
}

enum SessionEnd {
    Cancelled,
    ConfigChanged,
}

/// Broker connection worker
///
/// Subscribes to the configured topics and forwards every publish to the
/// application. A config change tears the client down and builds a new one.
pub struct MqttHandler {
    config_rx: watch::Receiver<MqttConfig>,
    msg_tx: mpsc::Sender<MQTTMessage>,
    status_tx: watch::Sender<MQTTStatus>,
    token: CancellationToken,
}

pub struct MqttHandle {
    status_rx: watch::Receiver<MQTTStatus>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MqttHandle {
    pub fn subscribe(&self) -> watch::Receiver<MQTTStatus> {
        self.status_rx.clone()
    }

    /// Cancels the worker and waits for it to disconnect
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!("MQTT task ended abnormally: {}", e);
        }
    }
}

impl MqttHandler {
    pub fn spawn(
        config_rx: watch::Receiver<MqttConfig>,
        msg_tx: mpsc::Sender<MQTTMessage>,
        token: CancellationToken,
    ) -> MqttHandle {
        let (status_tx, status_rx) = watch::channel(MQTTStatus::default());
        let handler = MqttHandler {
            config_rx,
            msg_tx,
            status_tx,
            token: token.clone(),
        };

        info!("Spawning MQTT handler");
        let task = tokio::spawn(async move {
            handler.run().await;
            info!("MQTT handler stopped");
        });

        MqttHandle {
            status_rx,
            token,
            task,
        }
    }

    async fn run(mut self) {
        loop {
            let config = self.config_rx.borrow_and_update().clone();

            let end = match build_client(&config) {
                Ok((client, eventloop)) => {
                    self.set_state(ConnectionState::Connecting);
                    self.run_session(&config, client, eventloop).await
                }
                Err(MqttError::NotConfigured) => {
                    info!("No MQTT broker configured, waiting for configuration");
                    self.set_state(ConnectionState::NotConfigured);
                    self.wait_for_config().await
                }
                Err(e) => {
                    warn!("Cannot connect to MQTT broker: {}", e);
                    self.record_error(e.to_string());
                    self.wait_for_config().await
                }
            };

            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::ConfigChanged => info!("MQTT configuration changed, reconnecting"),
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn wait_for_config(&mut self) -> SessionEnd {
        tokio::select! {
            _ = self.token.cancelled() => SessionEnd::Cancelled,
            changed = self.config_rx.changed() => match changed {
                Ok(()) => SessionEnd::ConfigChanged,
                Err(_) => {
                    self.token.cancelled().await;
                    SessionEnd::Cancelled
                }
            },
        }
    }

    async fn run_session(
        &mut self,
        config: &MqttConfig,
        client: AsyncClient,
        mut eventloop: EventLoop,
    ) -> SessionEnd {
        let topics = config.subscriptions();
        let mut config_open = true;

        let end = loop {
            tokio::select! {
                _ = self.token.cancelled() => break SessionEnd::Cancelled,
                changed = self.config_rx.changed(), if config_open => {
                    if changed.is_ok() {
                        break SessionEnd::ConfigChanged;
                    }
                    config_open = false;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker {}", config.broker_url);
                        self.set_state(ConnectionState::Connected);
                        // Clean sessions forget subscriptions, so every reconnect resubscribes
                        for topic in &topics {
                            match client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
                                Ok(()) => info!("Subscribed to {}", topic),
                                Err(e) => {
                                    error!("Failed to subscribe to {}: {}", topic, e);
                                    self.record_error(MqttError::from(e).to_string());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!("MQTT message on {}", publish.topic);
                        self.status_tx.send_modify(|status| {
                            status.messages_received += 1;
                            status.last_activity = Some(chrono::Local::now());
                        });
                        let message = MQTTMessage::from_topic(publish.topic, publish.payload.to_vec());
                        if self.msg_tx.send(message).await.is_err() {
                            debug!("Message receiver dropped, stopping MQTT handler");
                            break SessionEnd::Cancelled;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {}", e);
                        self.record_error(MqttError::from(e).to_string());
                        tokio::select! {
                            _ = self.token.cancelled() => break SessionEnd::Cancelled,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                        self.set_state(ConnectionState::Connecting);
                    }
                },
            }
        };

        let connected = self.status_tx.borrow().connection_state == ConnectionState::Connected;
        if connected {
            match client.try_disconnect() {
                Ok(()) => flush_disconnect(&mut eventloop).await,
                Err(e) => debug!("Disconnect request not delivered: {}", e),
            }
        }
        end
    }

    fn set_state(&self, state: ConnectionState) {
        self.status_tx.send_if_modified(|status| {
            if status.connection_state == state {
                return false;
            }
            status.connection_state = state;
            true
        });
    }

    fn record_error(&self, message: String) {
        self.status_tx.send_modify(|status| {
            status.connection_state = ConnectionState::Failed;
            status.error_messages.push(message);
            if status.error_messages.len() > MAX_ERROR_MESSAGES {
                status.error_messages.remove(0);
            }
        });
    }
}

/// Drives the event loop until the queued DISCONNECT went out
async fn flush_disconnect(eventloop: &mut EventLoop) {
    let flushed = tokio::time::timeout(Duration::from_millis(500), async {
        while let Ok(event) = eventloop.poll().await {
            if matches!(event, Event::Outgoing(Outgoing::Disconnect)) {
                break;
            }
        }
    })
    .await;
    if flushed.is_err() {
        debug!("Timed out waiting for MQTT disconnect");
    }
}

fn transport_for(kind: BrokerTransport) -> Transport {
    match kind {
        BrokerTransport::Tcp => Transport::Tcp,
        BrokerTransport::Tls => Transport::tls_with_default_config(),
        BrokerTransport::Ws => Transport::Ws,
        BrokerTransport::Wss => Transport::wss_with_default_config(),
    }
}

fn build_client(config: &MqttConfig) -> Result<(AsyncClient, EventLoop), MqttError> {
    let endpoint = config.broker_endpoint()?;
    debug!(
        "Connecting to {} over {:?} (port {})",
        endpoint.address, endpoint.transport, endpoint.port
    );
    let mut mqtt_options = MqttOptions::new(config::client_id(), endpoint.address, endpoint.port);
    mqtt_options.set_transport(transport_for(endpoint.transport));
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    if let Some((user, pass)) = config.credentials() {
        mqtt_options.set_credentials(user, pass);
    }
    Ok(AsyncClient::new(mqtt_options, config.channel_capacity.max(10)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_summary() {
        let mut status = MQTTStatus {
            connection_state: ConnectionState::NotConfigured,
            ..MQTTStatus::default()
        };
        assert_eq!(status.summary(), "MQTT broker not configured");

        status.connection_state = ConnectionState::Failed;
        status.error_messages.push("refused".into());
        assert_eq!(status.summary(), "MQTT error: refused");
    }

    #[tokio::test]
    async fn unconfigured_broker_reports_status_and_stops_on_cancel() {
        let (_config_tx, config_rx) = watch::channel(MqttConfig::default());
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let handle = MqttHandler::spawn(config_rx, msg_tx, CancellationToken::new());

        let mut status_rx = handle.subscribe();
        let status = status_rx
            .wait_for(|s| s.connection_state == ConnectionState::NotConfigured)
            .await
            .expect("status channel open")
            .clone();
        assert_eq!(status.summary(), "MQTT broker not configured");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn config_change_rebuilds_the_client() {
        let (config_tx, config_rx) = watch::channel(MqttConfig::default());
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let handle = MqttHandler::spawn(config_rx, msg_tx, CancellationToken::new());
        let mut status_rx = handle.subscribe();
        status_rx
            .wait_for(|s| s.connection_state == ConnectionState::NotConfigured)
            .await
            .expect("status channel open");

        config_tx.send_modify(|config| config.broker_url = "ftp://broker.example".into());
        let status = status_rx
            .wait_for(|s| s.connection_state == ConnectionState::Failed)
            .await
            .expect("status channel open")
            .clone();
        assert_eq!(status.error_messages.len(), 1);

        handle.shutdown().await;
        assert_eq!(
            status_rx.borrow().connection_state,
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn schemes_map_to_transports() {
        assert!(matches!(transport_for(BrokerTransport::Tcp), Transport::Tcp));
        assert!(matches!(transport_for(BrokerTransport::Tls), Transport::Tls(_)));
        assert!(matches!(transport_for(BrokerTransport::Ws), Transport::Ws));
        assert!(matches!(transport_for(BrokerTransport::Wss), Transport::Wss(_)));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_reported_as_failure() {
        let config = MqttConfig {
            broker_url: "http://broker.example/mqtt".into(),
            ..MqttConfig::default()
        };
        let (_config_tx, config_rx) = watch::channel(config);
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let handle = MqttHandler::spawn(config_rx, msg_tx, CancellationToken::new());

        let mut status_rx = handle.subscribe();
        let status = status_rx
            .wait_for(|s| s.connection_state == ConnectionState::Failed)
            .await
            .expect("status channel open")
            .clone();
        assert!(status.summary().contains("http"));

        handle.shutdown().await;
    }
}
