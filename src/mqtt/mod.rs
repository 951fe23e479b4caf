//! # MQTT transport
//!
//! Receives controller messages from the broker and hands them to the play loop
//! as raw `(topic, payload)` pairs. Nothing is published.
//!
//! ```text
//! mqtt/
//! ├── config.rs        - broker settings, subscription topics
//! ├── message.rs       - inbound message representation
//! └── mqtt_handler.rs  - connection task and status reporting
//! ```
//!
//! Subscriptions are the per-player topic with its trailing `playerN` segment
//! replaced by `+`, plus the fixed control topic that carries `connect`
//! messages.
//!
//! ```text
//! mqtt://host[:1883], tcp://, bare host ──► TCP
//! mqtts://host[:8883], ssl://          ──► TLS
//! ws://host[:80]/path                  ──► WebSocket
//! wss://host[:443]/path                ──► WebSocket over TLS
//! ```

pub mod config;
pub mod message;
pub mod mqtt_handler;

pub use config::MqttConfig;
pub use message::MQTTMessage;
pub use mqtt_handler::{ConnectionState, MQTTStatus, MqttError, MqttHandle, MqttHandler};
