use super::mqtt_handler::MqttError;
use crate::pairing::PlayerSlot;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;
const DEFAULT_WS_PORT: u16 = 80;
const DEFAULT_WSS_PORT: u16 = 443;

/// How the broker is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerTransport {
    Tcp,
    Tls,
    Ws,
    Wss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub transport: BrokerTransport,
    /// Host for TCP and TLS, the whole URL for WebSockets
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// `mqtt://`, `tcp://`, `mqtts://`, `ws://`, `wss://` or bare `host[:port]`;
    /// empty disables MQTT
    pub broker_url: String,
    pub user: String,
    pub pass: String,
    /// Per-player topic, e.g. `yokohama/hackathon/running/player1`
    pub topic_template: String,
    /// Fixed topic carrying `connect` messages
    pub control_topic: String,
    pub keep_alive_secs: u64,
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: String::new(),
            user: String::new(),
            pass: String::new(),
            topic_template: "yokohama/hackathon/running/player1".to_string(),
            control_topic: "dorosupi/controller".to_string(),
            keep_alive_secs: 5,
            channel_capacity: 100,
        }
    }
}

impl MqttConfig {
    /// Parses the broker URL into what the client needs to connect
    pub fn broker_endpoint(&self) -> Result<BrokerEndpoint, MqttError> {
        let url = self.broker_url.trim();
        if url.is_empty() {
            return Err(MqttError::NotConfigured);
        }

        let (transport, default_port, rest) = match url.split_once("://") {
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "mqtt" | "tcp" => (BrokerTransport::Tcp, DEFAULT_PORT, rest),
                "mqtts" | "ssl" => (BrokerTransport::Tls, DEFAULT_TLS_PORT, rest),
                "ws" => (BrokerTransport::Ws, DEFAULT_WS_PORT, rest),
                "wss" => (BrokerTransport::Wss, DEFAULT_WSS_PORT, rest),
                _ => return Err(MqttError::UnsupportedScheme(scheme.to_string())),
            },
            None => (BrokerTransport::Tcp, DEFAULT_PORT, url),
        };
        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| MqttError::InvalidBrokerUrl(url.to_string()))?;
                (host, port)
            }
            None => (authority, default_port),
        };
        if host.is_empty() {
            return Err(MqttError::InvalidBrokerUrl(url.to_string()));
        }

        // The WebSocket client connects to the URL itself, path included
        let address = match transport {
            BrokerTransport::Ws => format!("ws://{}", rest),
            BrokerTransport::Wss => format!("wss://{}", rest),
            BrokerTransport::Tcp | BrokerTransport::Tls => host.to_string(),
        };
        Ok(BrokerEndpoint {
            transport,
            address,
            port,
        })
    }

    /// Wildcard player topic plus the control topic
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics = vec![subscription_topic(&self.topic_template)];
        if !self.control_topic.is_empty() && !topics.contains(&self.control_topic) {
            topics.push(self.control_topic.clone());
        }
        topics
    }

    pub fn credentials(&self) -> Option<(String, String)> {
        (!self.user.is_empty()).then(|| (self.user.clone(), self.pass.clone()))
    }
}

fn is_player_segment(segment: &str) -> bool {
    segment == "+"
        || segment
            .strip_prefix("player")
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Replaces a trailing `/playerN` segment with the `+` wildcard
pub fn subscription_topic(template: &str) -> String {
    match template.rsplit_once('/') {
        Some((base, last)) if is_player_segment(last) => format!("{}/+", base),
        _ => template.to_string(),
    }
}

/// Topic a given player publishes on
pub fn player_topic(template: &str, slot: PlayerSlot) -> String {
    match template.rsplit_once('/') {
        Some((base, last)) if is_player_segment(last) => format!("{}/{}", base, slot),
        _ if template.is_empty() => slot.to_string(),
        _ => format!("{}/{}", template.trim_end_matches('/'), slot),
    }
}

/// `doodlerace-<hex>`, distinct per process start
pub fn client_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
        .unwrap_or_default();
    format!("doodlerace-{:x}", nanos ^ (std::process::id() as u64) << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_broker(url: &str) -> MqttConfig {
        MqttConfig {
            broker_url: url.to_string(),
            ..MqttConfig::default()
        }
    }

    fn endpoint(url: &str) -> Option<(BrokerTransport, String, u16)> {
        with_broker(url)
            .broker_endpoint()
            .ok()
            .map(|e| (e.transport, e.address, e.port))
    }

    #[test]
    fn broker_urls() {
        assert_eq!(
            endpoint("mqtt://broker.local:1884"),
            Some((BrokerTransport::Tcp, "broker.local".to_string(), 1884))
        );
        assert_eq!(
            endpoint("10.0.0.2"),
            Some((BrokerTransport::Tcp, "10.0.0.2".to_string(), 1883))
        );
        assert_eq!(
            endpoint("mqtts://broker.local"),
            Some((BrokerTransport::Tls, "broker.local".to_string(), 8883))
        );
        assert!(matches!(
            with_broker("http://broker.local").broker_endpoint(),
            Err(MqttError::UnsupportedScheme(s)) if s == "http"
        ));
        assert!(matches!(
            with_broker("tcp://host:port").broker_endpoint(),
            Err(MqttError::InvalidBrokerUrl(_))
        ));
        assert!(matches!(
            with_broker("  ").broker_endpoint(),
            Err(MqttError::NotConfigured)
        ));
    }

    #[test]
    fn websocket_urls_keep_their_path() {
        assert_eq!(
            endpoint("ws://192.168.1.20:9001/mqtt"),
            Some((
                BrokerTransport::Ws,
                "ws://192.168.1.20:9001/mqtt".to_string(),
                9001
            ))
        );
        assert_eq!(
            endpoint("WSS://broker.example/mqtt"),
            Some((
                BrokerTransport::Wss,
                "wss://broker.example/mqtt".to_string(),
                443
            ))
        );
        assert!(matches!(
            with_broker("ws:///mqtt").broker_endpoint(),
            Err(MqttError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn wildcard_replaces_player_segment() {
        assert_eq!(
            subscription_topic("yokohama/hackathon/running/player1"),
            "yokohama/hackathon/running/+"
        );
        assert_eq!(subscription_topic("game/events"), "game/events");
        assert_eq!(
            MqttConfig::default().subscriptions(),
            vec![
                "yokohama/hackathon/running/+".to_string(),
                "dorosupi/controller".to_string()
            ]
        );
    }

    #[test]
    fn player_topics() {
        assert_eq!(
            player_topic("a/b/player1", PlayerSlot::Player2),
            "a/b/player2"
        );
        assert_eq!(player_topic("a/b/+", PlayerSlot::Player1), "a/b/player1");
        assert_eq!(player_topic("a/b", PlayerSlot::Player1), "a/b/player1");
    }

    #[test]
    fn credentials_only_with_user() {
        assert_eq!(MqttConfig::default().credentials(), None);
        let config = MqttConfig {
            user: "race".into(),
            pass: "secret".into(),
            ..MqttConfig::default()
        };
        assert_eq!(
            config.credentials(),
            Some(("race".to_string(), "secret".to_string()))
        );
        assert!(client_id().starts_with("doodlerace-"));
    }
}
