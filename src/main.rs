pub mod app;
pub mod config;
pub mod controller;
pub mod drawings;
pub mod mqtt;
pub mod pairing;
pub mod race;

use crate::app::{render, run_play_loop, FrameSnapshot, PlayApp, PlayInputs};
use crate::controller::{debug_input, DebugKeys};
use crate::drawings::{DrawingStore, JsonDrawingStore};
use crate::mqtt::MqttHandler;
use crate::pairing::PairingRegistry;
use color_eyre::{eyre::eyre, Result};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = config::config_path();
    let app_config = config::load_config(&config_path)
        .await
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;
    info!("Static slot map: {} identities", app_config.slot_map().len());

    let token = CancellationToken::new();

    let (mqtt_config_tx, mqtt_config_rx) = watch::channel(app_config.mqtt.clone());
    let (mqtt_msg_tx, mqtt_msg_rx) = mpsc::channel(app_config.mqtt.channel_capacity.max(1));
    let mqtt_handle = MqttHandler::spawn(mqtt_config_rx, mqtt_msg_tx, token.clone());

    let (command_tx, command_rx) = mpsc::channel(100);
    debug_input::spawn_stdin_reader(command_tx)
        .map_err(|e| eyre!("Failed to start debug input: {}", e))?;

    let registry = PairingRegistry::new(app_config.slot_map(), app_config.stage);
    let mut app = PlayApp::new(
        registry,
        app_config.race.settings(),
        DebugKeys::new(&app_config.mqtt),
    );

    let store = JsonDrawingStore::new(&app_config.drawings.path);
    match store.list_drawings().await {
        Ok(drawings) => app.set_drawings(drawings),
        Err(e) => {
            warn!("{}", e);
            app.set_status(format!("Drawings unavailable: {}", e));
        }
    }

    let (frame_tx, frame_rx) = watch::channel(FrameSnapshot::default());
    let renderer = render::spawn_console_renderer(
        frame_rx,
        app_config.race.winning_position,
        token.clone(),
    );

    let inputs = PlayInputs {
        messages: mqtt_msg_rx,
        commands: command_rx,
        transport: mqtt_handle.subscribe(),
    };

    let play_token = token.clone();
    tokio::select! {
        _ = run_play_loop(app, inputs, frame_tx, app_config.race, play_token) => {}
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
            info!("Ctrl-C received, shutting down");
        }
    }

    token.cancel();
    mqtt_handle.shutdown().await;
    drop(mqtt_config_tx);
    renderer
        .await
        .map_err(|e| eyre!("Renderer task failed: {}", e))?;

    info!("Goodbye");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(eyre!("Failed to read .env file: {}", e));
        }
    }
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = match std::env::var("RUST_LOG").as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        Ok("warn") => Level::WARN,
        Ok("error") => Level::ERROR,
        _ => Level::INFO,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
