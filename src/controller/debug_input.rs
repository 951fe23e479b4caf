//! Keyboard substitution for controllers, read line by line from stdin
//!
//! Lines are either keys or commands:
//!
//! ```text
//! 1, 2                 connect as player 1 / 2 (stage) or run (race)
//! 1+, 1-               hold / release a race key
//! up/down/left/right   move player 1's drawing
//! list | select <id> | release | drop <controller> | games | race | again | back | status | quit
//! ```

use crate::mqtt::config::{player_topic, MqttConfig};
use crate::pairing::{PlayerSlot, SlotMap};
use crate::race::Impulse;
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Synthetic hardware addresses used by the `1` / `2` connect keys
pub const DEBUG_PLAYER1_ID: &str = "DE:B0:00:00:00:01";
pub const DEBUG_PLAYER2_ID: &str = "DE:B0:00:00:00:02";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Press and release
    Tap,
    Hold,
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
    Key { key: String, action: KeyAction },
    List,
    Select(String),
    Release,
    Drop(String),
    Games,
    Race,
    Again,
    Back,
    Status,
    Quit,
}

impl DebugCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match (word.to_lowercase().as_str(), rest) {
            ("", _) => return None,
            ("list", _) => DebugCommand::List,
            ("select", id) if !id.is_empty() => DebugCommand::Select(id.to_string()),
            ("release", _) => DebugCommand::Release,
            ("drop", id) if !id.is_empty() => DebugCommand::Drop(id.to_string()),
            ("games", _) => DebugCommand::Games,
            ("race", _) => DebugCommand::Race,
            ("again", _) => DebugCommand::Again,
            ("back", _) => DebugCommand::Back,
            ("status", _) => DebugCommand::Status,
            ("quit" | "exit", _) => DebugCommand::Quit,
            (key, "") => {
                let (key, action) = if let Some(key) = key.strip_suffix('+') {
                    (key, KeyAction::Hold)
                } else if let Some(key) = key.strip_suffix('-') {
                    (key, KeyAction::Release)
                } else {
                    (key, KeyAction::Tap)
                };
                if key.is_empty() {
                    return None;
                }
                DebugCommand::Key {
                    key: key.to_string(),
                    action,
                }
            }
            _ => return None,
        };
        Some(command)
    }
}

/// Turns debug keys into transport-shaped payloads or race edges
#[derive(Debug, Clone)]
pub struct DebugKeys {
    player1_topic: String,
    player2_topic: String,
}

impl DebugKeys {
    pub fn new(config: &MqttConfig) -> Self {
        Self {
            player1_topic: player_topic(&config.topic_template, PlayerSlot::Player1),
            player2_topic: player_topic(&config.topic_template, PlayerSlot::Player2),
        }
    }

    /// The synthetic identities always map onto their own slot
    pub fn register_identities(slot_map: &mut SlotMap) {
        slot_map.insert(DEBUG_PLAYER1_ID, PlayerSlot::Player1);
        slot_map.insert(DEBUG_PLAYER2_ID, PlayerSlot::Player2);
    }

    /// `(topic, payload)` a controller would have sent for this key on the stage
    ///
    /// Every payload carries the synthetic identity, so the registry never
    /// has to guess the sender from the topic.
    pub fn stage_payload(&self, key: &str) -> Option<(String, Vec<u8>)> {
        let (topic, body) = match key {
            "1" => (
                &self.player1_topic,
                serde_json::json!({ "event": "connect", "id": DEBUG_PLAYER1_ID }),
            ),
            "2" => (
                &self.player2_topic,
                serde_json::json!({ "event": "connect", "id": DEBUG_PLAYER2_ID }),
            ),
            "up" | "down" | "left" | "right" => (
                &self.player1_topic,
                serde_json::json!({ "button": key, "id": DEBUG_PLAYER1_ID }),
            ),
            _ => return None,
        };
        Some((topic.clone(), body.to_string().into_bytes()))
    }

    /// Race edges for a key; `1` drives player 1 and `2` drives player 2
    pub fn race_impulses(&self, key: &str, action: KeyAction) -> Vec<Impulse> {
        let slot = match key {
            "1" => PlayerSlot::Player1,
            "2" => PlayerSlot::Player2,
            _ => return Vec::new(),
        };
        match action {
            KeyAction::Tap => Impulse::tap(slot, key).to_vec(),
            KeyAction::Hold => vec![Impulse::pressed(slot, key)],
            KeyAction::Release => vec![Impulse::released(slot, key)],
        }
    }
}

/// Reads stdin on its own thread until EOF or until the receiver is gone
///
/// A plain thread is used so a pending read never holds up runtime shutdown.
pub fn spawn_stdin_reader(
    sender: mpsc::Sender<DebugCommand>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("debug-input".to_string())
        .spawn(move || {
            info!("Debug input ready, type 'status' for help");
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                match DebugCommand::parse(&line) {
                    Some(command) => {
                        debug!("Debug input: {:?}", command);
                        if sender.blocking_send(command).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("Unrecognized input: '{}'", line.trim()),
                }
            }
            debug!("Debug input stopped");
        })
}
