//! Controller to player to drawing pairing
//!
//! The pairing subsystem owns the answer to "which physical controller drives
//! which on-screen drawing, as which player":
//!
//! 1. [`registry`] - the pairing registry and its reassignment rules
//! 2. [`stage`] - offsets of paired drawings on the selection stage
//!
//! # Slot policy
//!
//! Slots are handed out first-come: the first distinct controller becomes
//! `player1`, the next one `player2`, a third one is ignored while both slots
//! are taken. Identities listed in the static slot map (configuration or the
//! debug input's synthetic addresses) always land on their mapped slot.

pub mod registry;
pub mod stage;

pub use registry::PairingRegistry;
pub use stage::{Position, StageBounds};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Logical player slot in the two-player race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerSlot {
    Player1,
    Player2,
}

impl PlayerSlot {
    pub const ALL: [PlayerSlot; 2] = [PlayerSlot::Player1, PlayerSlot::Player2];

    /// 1 or 2, as shown to the players
    pub fn number(&self) -> u8 {
        match self {
            PlayerSlot::Player1 => 1,
            PlayerSlot::Player2 => 2,
        }
    }

    /// Parses `player1` / `player2` (case-insensitive)
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.to_ascii_lowercase().as_str() {
            "player1" => Some(PlayerSlot::Player1),
            "player2" => Some(PlayerSlot::Player2),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlayerSlot::Player1 => write!(f, "player1"),
            PlayerSlot::Player2 => write!(f, "player2"),
        }
    }
}

/// Binding of one controller to one slot and one drawing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub controller_id: String,
    pub player_slot: PlayerSlot,
    pub drawing_id: String,
}

/// Outcome of a successful `connect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingChange {
    /// The pairing as it now stands
    pub pairing: Pairing,
    /// Drawing the controller held before this reconnect, if it changed
    pub replaced_drawing: Option<String>,
    /// Pairing removed because it held the same drawing
    pub evicted: Option<Pairing>,
    /// The active selection is now bound and must be cleared upstream
    pub clear_selection: bool,
}

/// Static identity to slot assignments, keys stored upper-cased
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotMap {
    entries: HashMap<String, PlayerSlot>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, controller_id: &str, slot: PlayerSlot) {
        self.entries
            .insert(controller_id.trim().to_uppercase(), slot);
    }

    pub fn get(&self, controller_id: &str) -> Option<PlayerSlot> {
        self.entries.get(&controller_id.to_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_hint_parsing() {
        assert_eq!(PlayerSlot::from_hint("player1"), Some(PlayerSlot::Player1));
        assert_eq!(PlayerSlot::from_hint("Player2"), Some(PlayerSlot::Player2));
        assert_eq!(PlayerSlot::from_hint("controller"), None);
        assert_eq!(PlayerSlot::Player2.number(), 2);
    }

    #[test]
    fn slot_map_is_case_insensitive() {
        let mut map = SlotMap::new();
        map.insert("00:4b:12:c4:ff:18", PlayerSlot::Player2);
        assert_eq!(map.get("00:4B:12:C4:FF:18"), Some(PlayerSlot::Player2));
        assert_eq!(map.get("00:00:00:00:00:00"), None);
    }
}
