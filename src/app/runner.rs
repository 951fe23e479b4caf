use super::play::{Control, FrameSnapshot, PlayApp};
use crate::config::RaceConfig;
use crate::controller::DebugCommand;
use crate::mqtt::{MQTTMessage, MQTTStatus};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Input channels of the play loop
pub struct PlayInputs {
    pub messages: mpsc::Receiver<MQTTMessage>,
    pub commands: mpsc::Receiver<DebugCommand>,
    pub transport: watch::Receiver<MQTTStatus>,
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn publish(frames: &watch::Sender<FrameSnapshot>, app: &PlayApp) {
    let snapshot = app.snapshot();
    frames.send_if_modified(|frame| {
        if *frame == snapshot {
            return false;
        }
        *frame = snapshot;
        true
    });
}

/// Drives the app until cancelled or asked to quit, then hands it back
pub async fn run_play_loop(
    mut app: PlayApp,
    mut inputs: PlayInputs,
    frames: watch::Sender<FrameSnapshot>,
    timing: RaceConfig,
    token: CancellationToken,
) -> PlayApp {
    let tick_period = Duration::from_millis(timing.tick_ms);
    let mut processing = interval(Duration::from_millis(timing.processing_interval_ms));
    processing.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut countdown: Option<Interval> = None;
    let mut countdown_epoch = app.countdown_epoch();
    let mut messages_open = true;
    let mut commands_open = true;
    let mut transport_open = true;

    app.set_transport_status(inputs.transport.borrow_and_update().summary());
    publish(&frames, &app);

    info!(
        "Play loop running ({} ms batches, {} ms countdown ticks)",
        timing.processing_interval_ms, timing.tick_ms
    );
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            message = inputs.messages.recv(), if messages_open => match message {
                Some(message) => app.handle_message(&message.topic, &message.payload),
                None => {
                    debug!("Message channel closed");
                    messages_open = false;
                }
            },
            command = inputs.commands.recv(), if commands_open => match command {
                Some(command) => {
                    if app.handle_command(command) == Control::Quit {
                        info!("Quit requested");
                        token.cancel();
                        break;
                    }
                }
                None => {
                    debug!("Command channel closed");
                    commands_open = false;
                }
            },
            changed = inputs.transport.changed(), if transport_open => match changed {
                Ok(()) => {
                    let summary = inputs.transport.borrow_and_update().summary();
                    app.set_transport_status(summary);
                }
                Err(_) => transport_open = false,
            },
            _ = next_tick(&mut countdown) => app.tick_countdown(),
            _ = processing.tick() => app.flush_impulses(),
        }

        // The countdown timer follows the race: a fresh race (new epoch) gets a
        // fresh timer so its first tick lands a full period after the start
        if app.countdown_active() {
            if countdown.is_none() || app.countdown_epoch() != countdown_epoch {
                debug!("Starting countdown timer");
                countdown = Some(interval_at(Instant::now() + tick_period, tick_period));
                countdown_epoch = app.countdown_epoch();
            }
        } else if countdown.take().is_some() {
            debug!("Countdown timer stopped");
        }

        publish(&frames, &app);
    }

    info!("Play loop stopped");
    app
}
