//! Pairing registry - sole writer of controller/slot/drawing bindings
//!
//! # Reassignment rules
//!
//! ```text
//! connect(controller C, active drawing D)
//!   ├─ no active drawing / no identity ──────────────► no-op
//!   ├─ C already paired ─────────────────────────────► keep C's slot, rebind to D
//!   ├─ C in static slot map ─────────────────────────► mapped slot, if free
//!   └─ otherwise ────────────────────────────────────► first free slot, else no-op
//! then: evict any other pairing holding D, centre D on the stage
//! ```
//!
//! A pairing that is about to be evicted for holding `D` does not block its slot,
//! so a new controller can take a drawing over from an old one.
//!
//! Impulse attribution prefers the controller identity. Controllers that publish
//! shakes without an identity on per-player topics (`.../player2`) are attributed
//! through the controller last seen with an identity on that same topic. The
//! topic name itself never picks a slot: slots are first-come, so the
//! controller on `.../player1` may well be `player2`.

use super::stage::{Position, Stage, StageBounds};
use super::{Pairing, PairingChange, PlayerSlot, SlotMap};
use crate::controller::payload::{ControllerEvent, EventKind};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct PairingRegistry {
    pairings: HashMap<String, Pairing>,
    /// Per-player topic hint to the controller last seen publishing on it
    topic_owners: HashMap<String, String>,
    slot_map: SlotMap,
    stage: Stage,
}

impl PairingRegistry {
    pub fn new(slot_map: SlotMap, bounds: StageBounds) -> Self {
        Self {
            pairings: HashMap::new(),
            topic_owners: HashMap::new(),
            slot_map,
            stage: Stage::new(bounds),
        }
    }

    /// Binds the controller behind a `connect` event to the active drawing
    ///
    /// Returns `None` without touching any state when the event is not a
    /// connect, no drawing is active, the controller has no identity, or no
    /// slot is available for it.
    pub fn bind_active_selection(
        &mut self,
        event: &ControllerEvent,
        active_drawing_id: Option<&str>,
    ) -> Option<PairingChange> {
        if event.kind != EventKind::Connect {
            debug!("Ignoring {} event for pairing", event.kind);
            return None;
        }
        let Some(drawing_id) = active_drawing_id else {
            debug!("Connect without active drawing, ignoring");
            return None;
        };
        let Some(controller_id) = event.source_id.as_deref() else {
            debug!("Connect without controller identity, ignoring: {}", event.raw);
            return None;
        };

        let existing = self.pairings.get(controller_id).cloned();
        let holder = self
            .pairings
            .values()
            .find(|p| p.drawing_id == drawing_id && p.controller_id != controller_id)
            .cloned();

        let player_slot = match &existing {
            Some(pairing) => pairing.player_slot,
            None => match self.resolve_slot(controller_id, holder.as_ref()) {
                Some(slot) => slot,
                None => {
                    debug!("No free slot for controller {}, ignoring", controller_id);
                    return None;
                }
            },
        };

        if let Some(evicted) = &holder {
            info!(
                "Evicting {} ({}) from drawing {}",
                evicted.controller_id, evicted.player_slot, evicted.drawing_id
            );
            self.pairings.remove(&evicted.controller_id);
        }

        let replaced_drawing = existing
            .map(|pairing| pairing.drawing_id)
            .filter(|previous| previous != drawing_id);
        if let Some(previous) = &replaced_drawing {
            self.stage.remove(previous);
        }

        let pairing = Pairing {
            controller_id: controller_id.to_string(),
            player_slot,
            drawing_id: drawing_id.to_string(),
        };
        self.pairings
            .insert(pairing.controller_id.clone(), pairing.clone());
        self.stage.center(drawing_id);

        info!(
            "Paired controller {} as {} with drawing {}",
            pairing.controller_id, pairing.player_slot, pairing.drawing_id
        );

        Some(PairingChange {
            pairing,
            replaced_drawing,
            evicted: holder,
            clear_selection: true,
        })
    }

    fn resolve_slot(&self, controller_id: &str, leaving: Option<&Pairing>) -> Option<PlayerSlot> {
        let taken = |slot: PlayerSlot| {
            self.pairings.values().any(|p| {
                p.player_slot == slot
                    && p.controller_id != controller_id
                    // The holder of the drawing being taken over is evicted
                    // right after this, so its slot counts as free
                    && leaving.map_or(true, |l| l.controller_id != p.controller_id)
            })
        };

        // A mapped identity never falls back to the other slot
        if let Some(mapped) = self.slot_map.get(controller_id) {
            return (!taken(mapped)).then_some(mapped);
        }
        PlayerSlot::ALL.into_iter().find(|slot| !taken(*slot))
    }

    /// Remembers which controller publishes on a per-player topic
    ///
    /// Only events carrying a hardware identity on a `playerN` topic are
    /// recorded. The latest identified sender owns the topic.
    pub fn note_sender(&mut self, event: &ControllerEvent) {
        let (Some(controller_id), Some(hint)) =
            (event.source_id.as_deref(), event.topic_hint.as_deref())
        else {
            return;
        };
        // Without an identity the source id is the hint itself
        if controller_id == hint || PlayerSlot::from_hint(hint).is_none() {
            return;
        }
        let previous = self
            .topic_owners
            .insert(hint.to_ascii_lowercase(), controller_id.to_string());
        if previous.as_deref() != Some(controller_id) {
            debug!("Topic {} now belongs to controller {}", hint, controller_id);
        }
    }

    /// Removes a controller's pairing outright
    pub fn release(&mut self, controller_id: &str) -> Option<Pairing> {
        let removed = self.pairings.remove(controller_id)?;
        self.stage.remove(&removed.drawing_id);
        info!(
            "Released controller {} ({})",
            removed.controller_id, removed.player_slot
        );
        Some(removed)
    }

    /// Forgets every pairing, used when the players back out of the minigame
    pub fn clear(&mut self) {
        if !self.pairings.is_empty() {
            info!("Clearing {} pairings", self.pairings.len());
        }
        self.pairings.clear();
        self.stage.clear();
    }

    /// Snapshot ordered by slot
    pub fn pairings_view(&self) -> Vec<Pairing> {
        let mut view: Vec<Pairing> = self.pairings.values().cloned().collect();
        view.sort_by_key(|p| p.player_slot);
        view
    }

    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }

    pub fn pairing_for_controller(&self, controller_id: &str) -> Option<&Pairing> {
        self.pairings.get(controller_id)
    }

    pub fn pairing_for_slot(&self, slot: PlayerSlot) -> Option<&Pairing> {
        self.pairings.values().find(|p| p.player_slot == slot)
    }

    pub fn drawing_for(&self, slot: PlayerSlot) -> Option<&str> {
        self.pairing_for_slot(slot).map(|p| p.drawing_id.as_str())
    }

    pub fn is_drawing_paired(&self, drawing_id: &str) -> bool {
        self.pairings.values().any(|p| p.drawing_id == drawing_id)
    }

    /// Player an impulse belongs to, if any
    pub fn slot_for(&self, event: &ControllerEvent) -> Option<PlayerSlot> {
        if let Some(pairing) = event
            .source_id
            .as_deref()
            .and_then(|id| self.pairings.get(id))
        {
            return Some(pairing.player_slot);
        }

        // Identity-less payloads only count for a controller already seen on
        // that topic, and only while it is paired
        event
            .topic_hint
            .as_deref()
            .and_then(|hint| self.topic_owners.get(&hint.to_ascii_lowercase()))
            .and_then(|owner| self.pairings.get(owner))
            .map(|pairing| pairing.player_slot)
    }

    /// Moves the drawing of whoever sent `event` on the selection stage
    pub fn apply_stage_move(&mut self, event: &ControllerEvent) -> Option<(String, Position)> {
        let slot = self.slot_for(event)?;
        let drawing_id = self.drawing_for(slot)?.to_string();
        let position = self.stage.apply_move(&drawing_id, event)?;
        Some((drawing_id, position))
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        self.stage.positions()
    }

    pub fn position(&self, drawing_id: &str) -> Position {
        self.stage.position(drawing_id)
    }
}
