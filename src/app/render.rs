//! Console renderer, logs what changed between published frames

use super::play::FrameSnapshot;
use crate::race::RacePhase;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const TRACK_WIDTH: usize = 40;

fn track(position: u32, winning_position: u32) -> String {
    let filled = (position as usize * TRACK_WIDTH) / winning_position.max(1) as usize;
    let filled = filled.min(TRACK_WIDTH);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(TRACK_WIDTH - filled))
}

/// Human readable lines for everything that differs between two frames
pub fn describe_changes(prev: &FrameSnapshot, next: &FrameSnapshot, winning_position: u32) -> Vec<String> {
    let mut lines = Vec::new();

    if prev.view != next.view {
        lines.push(format!("View: {}", next.view));
    }
    if prev.status != next.status && !next.status.is_empty() {
        lines.push(next.status.clone());
    }
    if prev.transport != next.transport && !next.transport.is_empty() {
        lines.push(next.transport.clone());
    }
    if prev.active_selection != next.active_selection {
        lines.push(match &next.active_selection {
            Some(id) => format!("Selected: {}", id),
            None => "Selected: -".to_string(),
        });
    }
    if prev.pairings != next.pairings {
        let pairs: Vec<String> = next
            .pairings
            .iter()
            .map(|p| format!("{}={} ({})", p.player_slot, p.drawing_id, p.controller_id))
            .collect();
        lines.push(format!("Pairings: [{}]", pairs.join(", ")));
    }

    match (&prev.race, &next.race) {
        (_, None) => {}
        (old, Some(race)) => {
            let phase_changed = old.as_ref().map(|r| r.phase) != Some(race.phase);
            let countdown_changed = old.as_ref().map(|r| r.countdown) != Some(race.countdown);
            if race.phase == RacePhase::Ready && (phase_changed || countdown_changed) {
                lines.push(format!("Countdown {}", race.countdown));
            }
            if old.as_ref() != Some(race) && race.phase != RacePhase::Ready {
                lines.push(format!(
                    "P1 {} {:>3}  P2 {} {:>3}",
                    track(race.player1_position, winning_position),
                    race.player1_position,
                    track(race.player2_position, winning_position),
                    race.player2_position
                ));
            }
            if let (true, Some(winner)) = (phase_changed, race.winner_number()) {
                lines.push(format!("Winner: player {}", winner));
            }
        }
    }

    lines
}

pub fn spawn_console_renderer(
    mut frames: watch::Receiver<FrameSnapshot>,
    winning_position: u32,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shown = FrameSnapshot::default();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let frame = frames.borrow_and_update().clone();
            for line in describe_changes(&shown, &frame, winning_position) {
                info!("{}", line);
            }
            if shown.positions != frame.positions {
                debug!("Stage positions: {:?}", frame.positions);
            }
            if shown.last_raw != frame.last_raw {
                if let Some(raw) = &frame.last_raw {
                    debug!("Last payload: {}", raw);
                }
            }
            shown = frame;
        }
        debug!("Renderer stopped");
    })
}
