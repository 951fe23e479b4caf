use crate::pairing::PlayerSlot;
use crate::race::impulse::{Impulse, ImpulseGate};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use tracing::{debug, info};

/// Tuning of a race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceSettings {
    /// Position at which a racer wins
    pub winning_position: u32,
    /// Position gained per registered impulse
    pub move_amount: u32,
    /// Countdown ticks before the race starts
    pub countdown_ticks: u8,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            winning_position: 100,
            move_amount: 2,
            countdown_ticks: 3,
        }
    }
}

/// Phase as seen by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RacePhase {
    Ready,
    Race,
    Finish,
}

/// Renderable race snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaceState {
    pub phase: RacePhase,
    pub player1_position: u32,
    pub player2_position: u32,
    /// Drives the renderer's wobble animation
    pub player1_impulses: u32,
    pub player2_impulses: u32,
    pub winner: Option<PlayerSlot>,
    /// Remaining countdown ticks, 0 once the race runs
    pub countdown: u8,
}

impl RaceState {
    pub fn winner_number(&self) -> Option<u8> {
        self.winner.map(|slot| slot.number())
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum RaceStage {
    Ready,
    Racing,
    Finished,
}

#[machine]
#[derive(Debug)]
pub struct RaceMachine<S: RaceStage> {
    settings: RaceSettings,
    positions: [u32; 2],
    impulses: [u32; 2],
    winner: Option<PlayerSlot>,
    countdown: u8,
    gate: ImpulseGate,
}

fn index(slot: PlayerSlot) -> usize {
    match slot {
        PlayerSlot::Player1 => 0,
        PlayerSlot::Player2 => 1,
    }
}

impl<S: RaceStage> RaceMachine<S> {
    pub fn settings(&self) -> &RaceSettings {
        &self.settings
    }

    fn state_as(&self, phase: RacePhase) -> RaceState {
        RaceState {
            phase,
            player1_position: self.positions[0],
            player2_position: self.positions[1],
            player1_impulses: self.impulses[0],
            player2_impulses: self.impulses[1],
            winner: self.winner,
            countdown: self.countdown,
        }
    }

    fn clear_progress(&mut self) {
        self.positions = [0; 2];
        self.impulses = [0; 2];
        self.winner = None;
        self.countdown = self.settings.countdown_ticks;
        self.gate.clear();
    }
}

impl RaceMachine<Ready> {
    pub fn create(settings: RaceSettings) -> Self {
        debug!("Creating race with settings: {:?}", settings);
        Self::new(
            settings,
            [0; 2],
            [0; 2],
            None,
            settings.countdown_ticks,
            ImpulseGate::new(),
        )
    }

    /// Counts down one tick, returns true once the countdown has run out
    pub fn tick(&mut self) -> bool {
        self.countdown = self.countdown.saturating_sub(1);
        debug!("Countdown: {}", self.countdown);
        self.countdown == 0
    }

    /// Keys pressed during the countdown are tracked but never counted
    pub fn observe(&mut self, impulses: &[Impulse]) {
        for impulse in impulses {
            self.gate.register(impulse);
        }
    }

    pub fn start(mut self) -> RaceMachine<Racing> {
        info!("Race started");
        self.countdown = 0;
        self.transition()
    }

    pub fn snapshot(&self) -> RaceState {
        self.state_as(RacePhase::Ready)
    }
}

impl RaceMachine<Racing> {
    /// Applies one edge; returns the winner if this impulse crossed the line
    pub fn advance(&mut self, impulse: &Impulse) -> Option<PlayerSlot> {
        if !self.gate.register(impulse) {
            return None;
        }

        let i = index(impulse.slot);
        self.impulses[i] += 1;
        self.positions[i] = self.positions[i]
            .saturating_add(self.settings.move_amount)
            .min(self.settings.winning_position);
        debug!(
            "{} advanced to {} ({} impulses)",
            impulse.slot, self.positions[i], self.impulses[i]
        );

        if self.positions[i] >= self.settings.winning_position {
            self.winner = Some(impulse.slot);
        }
        self.winner
    }

    pub fn finish(self) -> RaceMachine<Finished> {
        info!(
            "Race finished, winner: {}",
            self.winner
                .map(|slot| slot.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        self.transition()
    }

    pub fn reset(mut self) -> RaceMachine<Ready> {
        self.clear_progress();
        self.transition()
    }

    pub fn snapshot(&self) -> RaceState {
        self.state_as(RacePhase::Race)
    }
}

impl RaceMachine<Finished> {
    pub fn reset(mut self) -> RaceMachine<Ready> {
        info!("Replaying race");
        self.clear_progress();
        self.transition()
    }

    pub fn snapshot(&self) -> RaceState {
        self.state_as(RacePhase::Finish)
    }
}

/// Runtime holder for whichever state the race is in
#[derive(Debug)]
pub enum RaceSession {
    Ready(RaceMachine<Ready>),
    Racing(RaceMachine<Racing>),
    Finished(RaceMachine<Finished>),
}

impl RaceSession {
    pub fn new(settings: RaceSettings) -> Self {
        RaceSession::Ready(RaceMachine::create(settings))
    }

    pub fn phase(&self) -> RacePhase {
        match self {
            RaceSession::Ready(_) => RacePhase::Ready,
            RaceSession::Racing(_) => RacePhase::Race,
            RaceSession::Finished(_) => RacePhase::Finish,
        }
    }

    /// Advances the countdown; no effect outside `Ready`
    pub fn tick(self) -> Self {
        match self {
            RaceSession::Ready(mut machine) => {
                if machine.tick() {
                    RaceSession::Racing(machine.start())
                } else {
                    RaceSession::Ready(machine)
                }
            }
            other => other,
        }
    }

    /// Processes one batch of edges
    ///
    /// Player 1 edges are processed before player 2 edges; within a player the
    /// arrival order is kept. Once a winner is found the rest of the batch is
    /// dropped.
    pub fn process_batch(self, mut batch: Vec<Impulse>) -> Self {
        batch.sort_by_key(|impulse| impulse.slot);

        match self {
            RaceSession::Ready(mut machine) => {
                machine.observe(&batch);
                RaceSession::Ready(machine)
            }
            RaceSession::Racing(mut machine) => {
                for impulse in &batch {
                    if machine.advance(impulse).is_some() {
                        return RaceSession::Finished(machine.finish());
                    }
                }
                RaceSession::Racing(machine)
            }
            finished @ RaceSession::Finished(_) => {
                if !batch.is_empty() {
                    debug!("Race finished, dropping {} edges", batch.len());
                }
                finished
            }
        }
    }

    /// Back to `Ready` with cleared progress and a fresh countdown
    pub fn reset(self) -> Self {
        match self {
            RaceSession::Ready(machine) => RaceSession::Ready(RaceMachine::create(*machine.settings())),
            RaceSession::Racing(machine) => RaceSession::Ready(machine.reset()),
            RaceSession::Finished(machine) => RaceSession::Ready(machine.reset()),
        }
    }

    pub fn snapshot(&self) -> RaceState {
        match self {
            RaceSession::Ready(machine) => machine.snapshot(),
            RaceSession::Racing(machine) => machine.snapshot(),
            RaceSession::Finished(machine) => machine.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn racing() -> RaceSession {
        let mut session = RaceSession::new(RaceSettings::default());
        for _ in 0..3 {
            session = session.tick();
        }
        assert_eq!(session.phase(), RacePhase::Race);
        session
    }

    fn taps(slot: PlayerSlot, count: usize) -> Vec<Impulse> {
        (0..count).flat_map(|_| Impulse::tap(slot, "1")).collect()
    }

    #[test]
    fn countdown_takes_three_ticks() {
        let mut session = RaceSession::new(RaceSettings::default());
        assert_eq!(session.snapshot().countdown, 3);
        session = session.tick().tick();
        assert_eq!(session.phase(), RacePhase::Ready);
        assert_eq!(session.snapshot().countdown, 1);
        session = session.tick();
        assert_eq!(session.phase(), RacePhase::Race);
        assert_eq!(session.snapshot().countdown, 0);
    }

    #[test]
    fn impulses_during_countdown_are_ignored() {
        let session = RaceSession::new(RaceSettings::default());
        let session = session.process_batch(taps(PlayerSlot::Player1, 5));
        let state = session.snapshot();
        assert_eq!(state.player1_position, 0);
        assert_eq!(state.player1_impulses, 0);
    }

    #[test]
    fn key_held_through_countdown_does_not_count() {
        let session = RaceSession::new(RaceSettings::default())
            .process_batch(vec![Impulse::pressed(PlayerSlot::Player1, "1")]);
        let session = session.tick().tick().tick();
        let session = session.process_batch(vec![Impulse::pressed(PlayerSlot::Player1, "1")]);
        assert_eq!(session.snapshot().player1_position, 0);
        let session = session.process_batch(vec![
            Impulse::released(PlayerSlot::Player1, "1"),
            Impulse::pressed(PlayerSlot::Player1, "1"),
        ]);
        assert_eq!(session.snapshot().player1_position, 2);
    }

    #[test]
    fn each_impulse_advances_and_counts() {
        let session = racing().process_batch(taps(PlayerSlot::Player2, 3));
        let state = session.snapshot();
        assert_eq!(state.player2_position, 6);
        assert_eq!(state.player2_impulses, 3);
        assert_eq!(state.player1_position, 0);
    }

    #[test]
    fn player1_wins_a_same_batch_tie() {
        let session = racing()
            .process_batch(taps(PlayerSlot::Player1, 49))
            .process_batch(taps(PlayerSlot::Player2, 49));
        let state = session.snapshot();
        assert_eq!((state.player1_position, state.player2_position), (98, 98));

        let mut batch = taps(PlayerSlot::Player2, 1);
        batch.extend(taps(PlayerSlot::Player1, 1));
        let session = session.process_batch(batch);

        let state = session.snapshot();
        assert_eq!(state.phase, RacePhase::Finish);
        assert_eq!(state.winner_number(), Some(1));
        assert_eq!(state.player1_position, 100);
        assert_eq!(state.player2_position, 98);
    }

    #[test]
    fn winner_is_frozen_after_finish() {
        let session = racing().process_batch(taps(PlayerSlot::Player2, 50));
        assert_eq!(session.snapshot().winner, Some(PlayerSlot::Player2));
        let session = session.process_batch(taps(PlayerSlot::Player1, 60)).tick();
        let state = session.snapshot();
        assert_eq!(state.winner, Some(PlayerSlot::Player2));
        assert_eq!(state.player1_position, 0);
    }

    #[test]
    fn reset_after_finish_restarts_countdown() {
        let session = racing().process_batch(taps(PlayerSlot::Player1, 50));
        assert_eq!(session.phase(), RacePhase::Finish);

        let session = session.reset();
        let state = session.snapshot();
        assert_eq!(state.phase, RacePhase::Ready);
        assert_eq!(state.player1_position, 0);
        assert_eq!(state.player2_position, 0);
        assert_eq!(state.player1_impulses, 0);
        assert_eq!(state.winner, None);
        assert_eq!(state.countdown, 3);

        let session = session.tick().tick().tick();
        assert_eq!(session.phase(), RacePhase::Race);
    }

    #[test]
    fn positions_clamp_with_odd_step() {
        let settings = RaceSettings {
            winning_position: 10,
            move_amount: 3,
            countdown_ticks: 1,
        };
        let session = RaceSession::new(settings)
            .tick()
            .process_batch(taps(PlayerSlot::Player1, 4));
        let state = session.snapshot();
        assert_eq!(state.player1_position, 10);
        assert_eq!(state.winner, Some(PlayerSlot::Player1));
    }

    proptest! {
        #[test]
        fn positions_are_monotonic_and_bounded(
            batches in proptest::collection::vec(
                proptest::collection::vec((any::<bool>(), any::<bool>(), 0u8..3), 0..12),
                0..30
            )
        ) {
            let mut session = racing();
            let mut last = session.snapshot();
            for batch in batches {
                let impulses = batch
                    .into_iter()
                    .map(|(second, pressed, key)| {
                        let slot = if second { PlayerSlot::Player2 } else { PlayerSlot::Player1 };
                        if pressed {
                            Impulse::pressed(slot, key.to_string())
                        } else {
                            Impulse::released(slot, key.to_string())
                        }
                    })
                    .collect();
                session = session.process_batch(impulses);
                let state = session.snapshot();
                prop_assert!(state.player1_position >= last.player1_position);
                prop_assert!(state.player2_position >= last.player2_position);
                prop_assert!(state.player1_position <= 100);
                prop_assert!(state.player2_position <= 100);
                prop_assert_eq!(state.winner.is_some(), state.phase == RacePhase::Finish);
                if last.winner.is_some() {
                    prop_assert_eq!(state.winner, last.winner);
                }
                last = state;
            }
        }
    }
}
