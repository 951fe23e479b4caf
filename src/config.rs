//! Application configuration
//!
//! Loaded from `<config dir>/doodlerace/config.toml`, which is created with
//! defaults on first start. Environment variables (optionally from a `.env`
//! file) override individual values:
//!
//! | Variable                     | Field                   |
//! |------------------------------|-------------------------|
//! | `DOODLERACE_MQTT_BROKER_URL` | `mqtt.broker_url`       |
//! | `DOODLERACE_MQTT_USER`       | `mqtt.user`             |
//! | `DOODLERACE_MQTT_PASS`       | `mqtt.pass`             |
//! | `DOODLERACE_MQTT_TOPIC`      | `mqtt.topic_template`   |
//! | `DOODLERACE_PLAYER1_ID`      | `players.player1_id`    |
//! | `DOODLERACE_PLAYER2_ID`      | `players.player2_id`    |
//! | `DOODLERACE_DRAWINGS`        | `drawings.path`         |

use crate::controller::DebugKeys;
use crate::mqtt::MqttConfig;
use crate::pairing::{PlayerSlot, SlotMap, StageBounds};
use crate::race::RaceSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "doodlerace";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub players: PlayersConfig,
    pub stage: StageBounds,
    pub race: RaceConfig,
    pub drawings: DrawingsConfig,
}

/// Controllers that always play as a fixed player
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayersConfig {
    pub player1_id: String,
    pub player2_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub winning_position: u32,
    pub move_amount: u32,
    pub countdown_ticks: u8,
    /// Countdown tick length
    pub tick_ms: u64,
    /// Impulse batches are processed once per interval
    pub processing_interval_ms: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        let settings = RaceSettings::default();
        Self {
            winning_position: settings.winning_position,
            move_amount: settings.move_amount,
            countdown_ticks: settings.countdown_ticks,
            tick_ms: 1000,
            processing_interval_ms: 16,
        }
    }
}

impl RaceConfig {
    pub fn settings(&self) -> RaceSettings {
        RaceSettings {
            winning_position: self.winning_position,
            move_amount: self.move_amount,
            countdown_ticks: self.countdown_ticks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawingsConfig {
    /// JSON catalogue with an `items` array
    pub path: String,
}

impl Default for DrawingsConfig {
    fn default() -> Self {
        Self {
            path: "drawings.json".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.race.winning_position == 0 {
            return Err(ConfigError::InvalidValue(
                "race.winning_position must be positive".into(),
            ));
        }
        if self.race.move_amount == 0 {
            return Err(ConfigError::InvalidValue(
                "race.move_amount must be positive".into(),
            ));
        }
        if self.race.countdown_ticks == 0 {
            return Err(ConfigError::InvalidValue(
                "race.countdown_ticks must be at least 1".into(),
            ));
        }
        if self.race.tick_ms == 0 || self.race.processing_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "race intervals must be positive".into(),
            ));
        }
        if self.stage.min >= self.stage.max {
            return Err(ConfigError::InvalidValue(format!(
                "stage.min ({}) must be below stage.max ({})",
                self.stage.min, self.stage.max
            )));
        }
        Ok(())
    }

    /// Applies overrides from a variable lookup, see the module docs
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets: [(&str, &mut String); 7] = [
            ("DOODLERACE_MQTT_BROKER_URL", &mut self.mqtt.broker_url),
            ("DOODLERACE_MQTT_USER", &mut self.mqtt.user),
            ("DOODLERACE_MQTT_PASS", &mut self.mqtt.pass),
            ("DOODLERACE_MQTT_TOPIC", &mut self.mqtt.topic_template),
            ("DOODLERACE_PLAYER1_ID", &mut self.players.player1_id),
            ("DOODLERACE_PLAYER2_ID", &mut self.players.player2_id),
            ("DOODLERACE_DRAWINGS", &mut self.drawings.path),
        ];
        for (name, target) in targets {
            if let Some(value) = lookup(name) {
                debug!("Configuration override from {}", name);
                *target = value;
            }
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Static identity -> slot map, including the debug keyboard identities
    pub fn slot_map(&self) -> SlotMap {
        let mut map = SlotMap::new();
        DebugKeys::register_identities(&mut map);
        for (id, slot) in [
            (&self.players.player1_id, PlayerSlot::Player1),
            (&self.players.player2_id, PlayerSlot::Player2),
        ] {
            if !id.trim().is_empty() {
                map.insert(id.trim(), slot);
            }
        }
        map
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }
}

pub fn config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

/// Writes a default configuration if none exists yet
pub async fn ensure_default_config(path: &Path) -> Result<(), ConfigError> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if !exists {
        info!("Creating default configuration at {}", path.display());
        AppConfig::default().save(path).await?;
    }
    Ok(())
}

/// Default file if needed, then file contents, then environment overrides
pub async fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    ensure_default_config(path).await?;
    let mut config = AppConfig::load(path).await?;
    config.apply_env();
    config.validate()?;
    info!("Configuration loaded from {}", path.display());
    Ok(config)
}
