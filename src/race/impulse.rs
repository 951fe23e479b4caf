//! Edge detection for race impulses

use crate::pairing::PlayerSlot;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEdge {
    Pressed,
    Released,
}

/// One input edge attributed to a player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Impulse {
    pub slot: PlayerSlot,
    /// Physical button or key the edge belongs to
    pub key: String,
    pub edge: KeyEdge,
}

impl Impulse {
    pub fn pressed(slot: PlayerSlot, key: impl Into<String>) -> Self {
        Self {
            slot,
            key: key.into(),
            edge: KeyEdge::Pressed,
        }
    }

    pub fn released(slot: PlayerSlot, key: impl Into<String>) -> Self {
        Self {
            slot,
            key: key.into(),
            edge: KeyEdge::Released,
        }
    }

    /// A discrete transport message: press immediately followed by release
    pub fn tap(slot: PlayerSlot, key: impl Into<String>) -> [Self; 2] {
        let key = key.into();
        [Self::pressed(slot, key.clone()), Self::released(slot, key)]
    }
}

/// Tracks which keys are held, per player
///
/// Only a released -> pressed transition counts; auto-repeat presses while a
/// key is held are swallowed.
#[derive(Debug, Clone, Default)]
pub struct ImpulseGate {
    held: HashMap<(PlayerSlot, String), bool>,
}

impl ImpulseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one edge, returns true if it registers as a new impulse
    pub fn register(&mut self, impulse: &Impulse) -> bool {
        let held = self
            .held
            .entry((impulse.slot, impulse.key.clone()))
            .or_insert(false);
        match impulse.edge {
            KeyEdge::Pressed if !*held => {
                *held = true;
                true
            }
            KeyEdge::Pressed => false,
            KeyEdge::Released => {
                *held = false;
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holding_does_not_repeat() {
        let mut gate = ImpulseGate::new();
        let press = Impulse::pressed(PlayerSlot::Player1, "1");
        assert!(gate.register(&press));
        assert!(!gate.register(&press));
        assert!(!gate.register(&Impulse::released(PlayerSlot::Player1, "1")));
        assert!(gate.register(&press));
    }

    #[test]
    fn players_and_keys_are_independent() {
        let mut gate = ImpulseGate::new();
        assert!(gate.register(&Impulse::pressed(PlayerSlot::Player1, "a")));
        assert!(gate.register(&Impulse::pressed(PlayerSlot::Player2, "a")));
        assert!(gate.register(&Impulse::pressed(PlayerSlot::Player1, "b")));
    }

    #[test]
    fn taps_always_register() {
        let mut gate = ImpulseGate::new();
        for _ in 0..3 {
            let [press, release] = Impulse::tap(PlayerSlot::Player2, "run");
            assert!(gate.register(&press));
            assert!(!gate.register(&release));
        }
    }
}
