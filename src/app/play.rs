use crate::controller::debug_input::{DebugCommand, DebugKeys, KeyAction};
use crate::controller::payload::{normalize, ControllerEvent, EventKind};
use crate::drawings::Drawing;
use crate::pairing::{Pairing, PairingRegistry, PlayerSlot, Position};
use crate::race::{Impulse, RacePhase, RaceSession, RaceSettings, RaceState};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

const HELP: &str = "keys: 1 2 up down left right (1+/1- hold/release in race) | \
                    commands: list, select <id>, release, drop <controller>, games, race, again, back, status, quit";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Stage,
    GameSelection,
    Race,
    /// Race chosen but a player has no drawing yet
    RaceWaiting,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            View::Stage => "stage",
            View::GameSelection => "game selection",
            View::Race => "race",
            View::RaceWaiting => "race (waiting for players)",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// Everything a renderer needs to draw one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSnapshot {
    pub view: View,
    pub status: String,
    pub transport: String,
    pub active_selection: Option<String>,
    pub pairings: Vec<Pairing>,
    pub positions: BTreeMap<String, Position>,
    pub race: Option<RaceState>,
    pub last_raw: Option<String>,
}

pub struct PlayApp {
    view: View,
    drawings: Vec<Drawing>,
    active_selection: Option<String>,
    registry: PairingRegistry,
    race: Option<RaceSession>,
    race_settings: RaceSettings,
    pending: Vec<Impulse>,
    debug_keys: DebugKeys,
    status: String,
    transport: String,
    last_raw: Option<String>,
    /// Bumped whenever a fresh countdown has to start
    countdown_epoch: u64,
}

impl PlayApp {
    pub fn new(registry: PairingRegistry, race_settings: RaceSettings, debug_keys: DebugKeys) -> Self {
        Self {
            view: View::Stage,
            drawings: Vec::new(),
            active_selection: None,
            registry,
            race: None,
            race_settings,
            pending: Vec::new(),
            debug_keys,
            status: "Select a drawing and press connect on a controller".to_string(),
            transport: String::new(),
            last_raw: None,
            countdown_epoch: 0,
        }
    }

    pub fn set_drawings(&mut self, drawings: Vec<Drawing>) {
        info!("{} drawings available", drawings.len());
        self.drawings = drawings;
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn set_transport_status(&mut self, transport: impl Into<String>) {
        self.transport = transport.into();
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn registry(&self) -> &PairingRegistry {
        &self.registry
    }

    pub fn race_phase(&self) -> Option<RacePhase> {
        self.race.as_ref().map(RaceSession::phase)
    }

    pub fn countdown_epoch(&self) -> u64 {
        self.countdown_epoch
    }

    /// True while a race sits in its countdown
    pub fn countdown_active(&self) -> bool {
        self.race_phase() == Some(RacePhase::Ready)
    }

    pub fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        let event = normalize(payload, topic);
        self.handle_event(event);
    }

    pub fn handle_event(&mut self, event: ControllerEvent) {
        debug!("{} event from {:?}: {}", event.kind, event.source_id, event.raw);
        self.last_raw = Some(event.raw.clone());
        // Identified senders claim their topic before the event is routed
        self.registry.note_sender(&event);

        match event.kind {
            EventKind::Connect => self.handle_connect(&event),
            kind if kind.is_impulse() => match self.view {
                View::Stage => {
                    if let Some((drawing_id, position)) = self.registry.apply_stage_move(&event) {
                        debug!("Moved {} to ({}, {})", drawing_id, position.x, position.y);
                    }
                }
                View::Race => match self.registry.slot_for(&event) {
                    Some(slot) => self.pending.extend(Impulse::tap(slot, event.impulse_key())),
                    None => debug!("Impulse from unpaired controller dropped"),
                },
                View::GameSelection | View::RaceWaiting => {}
            },
            _ => debug!("Ignoring unrecognized payload: {}", event.raw),
        }
    }

    fn handle_connect(&mut self, event: &ControllerEvent) {
        let Some(change) = self
            .registry
            .bind_active_selection(event, self.active_selection.as_deref())
        else {
            return;
        };

        if change.clear_selection {
            self.active_selection = None;
        }
        self.status = match &change.evicted {
            Some(evicted) => format!(
                "{} now drives {} ({} was released)",
                change.pairing.player_slot, change.pairing.drawing_id, evicted.controller_id
            ),
            None => format!(
                "{} now drives {}",
                change.pairing.player_slot, change.pairing.drawing_id
            ),
        };

        if self.view == View::RaceWaiting {
            self.enter_race();
        }
    }

    pub fn handle_command(&mut self, command: DebugCommand) -> Control {
        match command {
            DebugCommand::Key { key, action } => self.handle_key(&key, action),
            DebugCommand::List => {
                let listing: Vec<String> = self
                    .drawings
                    .iter()
                    .map(|d| {
                        if self.registry.is_drawing_paired(&d.id) {
                            format!("{}*", d.id)
                        } else {
                            d.id.clone()
                        }
                    })
                    .collect();
                self.status = if listing.is_empty() {
                    "No drawings available".to_string()
                } else {
                    format!("Drawings: {}", listing.join(", "))
                };
            }
            DebugCommand::Select(id) => self.select(&id),
            DebugCommand::Release => {
                if self.active_selection.take().is_some() {
                    self.status = "Selection released".to_string();
                }
            }
            DebugCommand::Drop(controller_id) => {
                let removed = self
                    .registry
                    .release(&controller_id)
                    .or_else(|| self.registry.release(&controller_id.to_uppercase()));
                self.status = match removed {
                    Some(pairing) => format!("{} released", pairing.player_slot),
                    None => format!("No pairing for {}", controller_id),
                };
            }
            DebugCommand::Games => self.open_games(),
            DebugCommand::Race => match self.view {
                View::GameSelection | View::RaceWaiting => self.enter_race(),
                _ => self.status = "Open the game selection first".to_string(),
            },
            DebugCommand::Again => self.restart_race(),
            DebugCommand::Back => self.back(),
            DebugCommand::Status => self.status = HELP.to_string(),
            DebugCommand::Quit => return Control::Quit,
        }
        Control::Continue
    }

    fn handle_key(&mut self, key: &str, action: KeyAction) {
        match self.view {
            View::Stage => match self.debug_keys.stage_payload(key) {
                Some((topic, payload)) => self.handle_message(&topic, &payload),
                None => self.status = format!("Key '{}' does nothing here", key),
            },
            View::Race => {
                let impulses = self.debug_keys.race_impulses(key, action);
                if impulses.is_empty() {
                    self.status = format!("Key '{}' does nothing here", key);
                }
                self.pending.extend(impulses);
            }
            View::GameSelection | View::RaceWaiting => {}
        }
    }

    fn select(&mut self, id: &str) {
        if self.view != View::Stage {
            self.status = "Drawings can only be selected on the stage".to_string();
            return;
        }
        if self.drawings.iter().any(|d| d.id == id) {
            info!("Selected drawing {}", id);
            self.active_selection = Some(id.to_string());
            self.status = format!("{} selected, press connect on a controller", id);
        } else {
            self.status = format!("Unknown drawing {}", id);
        }
    }

    fn open_games(&mut self) {
        if self.view != View::Stage {
            return;
        }
        if self.registry.is_empty() {
            self.status = "Pair a controller first".to_string();
            return;
        }
        self.view = View::GameSelection;
        let describe = |slot: PlayerSlot| {
            format!("{}: {}", slot, self.registry.drawing_for(slot).unwrap_or("-"))
        };
        self.status = format!(
            "Choose a game ({}, {})",
            describe(PlayerSlot::Player1),
            describe(PlayerSlot::Player2)
        );
    }

    fn enter_race(&mut self) {
        let ready = PlayerSlot::ALL
            .iter()
            .all(|slot| self.registry.drawing_for(*slot).is_some());
        if !ready {
            self.view = View::RaceWaiting;
            self.status = "Waiting for both players to pick a drawing".to_string();
            return;
        }

        info!("Starting race");
        self.view = View::Race;
        self.pending.clear();
        self.race = Some(RaceSession::new(self.race_settings));
        self.countdown_epoch += 1;
        self.status = format!("Get ready... {}", self.race_settings.countdown_ticks);
    }

    fn restart_race(&mut self) {
        let Some(race) = self.race.take() else {
            self.status = "No race to restart".to_string();
            return;
        };
        info!("Restarting race");
        self.pending.clear();
        self.race = Some(race.reset());
        self.countdown_epoch += 1;
        self.status = format!("Get ready... {}", self.race_settings.countdown_ticks);
    }

    fn back(&mut self) {
        match self.view {
            View::Race | View::RaceWaiting => {
                info!("Leaving race, clearing pairings");
                self.race = None;
                self.pending.clear();
                self.registry.clear();
                self.active_selection = None;
                self.view = View::Stage;
                self.status = "Back on stage, pair controllers again".to_string();
            }
            View::GameSelection => {
                self.view = View::Stage;
                self.status = "Back on stage".to_string();
            }
            View::Stage => {}
        }
    }

    /// One countdown tick
    pub fn tick_countdown(&mut self) {
        let Some(race) = self.race.take() else {
            return;
        };
        let race = race.tick();
        let state = race.snapshot();
        self.status = match state.phase {
            RacePhase::Ready => format!("Get ready... {}", state.countdown),
            _ => "Go! Shake to run".to_string(),
        };
        self.race = Some(race);
    }

    /// Feeds the impulses collected since the last call into the race
    pub fn flush_impulses(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let Some(race) = self.race.take() else {
            debug!("No race running, dropping {} edges", batch.len());
            return;
        };

        let was_finished = race.phase() == RacePhase::Finish;
        let race = race.process_batch(batch);
        if !was_finished && race.phase() == RacePhase::Finish {
            if let Some(winner) = race.snapshot().winner_number() {
                info!("Player {} wins", winner);
                self.status = format!("Player {} wins! 'again' to replay, 'back' to leave", winner);
            }
        }
        self.race = Some(race);
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            view: self.view,
            status: self.status.clone(),
            transport: self.transport.clone(),
            active_selection: self.active_selection.clone(),
            pairings: self.registry.pairings_view(),
            positions: self
                .registry
                .positions()
                .iter()
                .map(|(id, position)| (id.clone(), *position))
                .collect(),
            race: self.race.as_ref().map(RaceSession::snapshot),
            last_raw: self.last_raw.clone(),
        }
    }
}
