use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    DisplayConfig, GateConfig, GateConfigError, deserialize_duration_from_seconds,
    serialize_duration_to_seconds,
};

/// Errors produced when the application settings are unusable.
#[derive(Debug, Error, PartialEq)]
pub enum AppConfigError {
    /// A duration that drives a timer or a timeout was set to zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// The gate tuning is inconsistent.
    #[error(transparent)]
    Gate(#[from] GateConfigError),
}

/// Provides the default value for state_path.
fn default_state_path() -> PathBuf {
    PathBuf::from("data/gate_state.json")
}

/// Provides the default value for persist_interval_secs.
fn default_persist_interval() -> Duration {
    Duration::from_secs(60)
}

/// Provides the default value for stats_interval_secs.
fn default_stats_interval() -> Duration {
    Duration::from_secs(300)
}

/// Provides the default value for species_reload_interval_secs.
fn default_species_reload_interval() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default value for shutdown_timeout.
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default value for event_channel_capacity.
fn default_event_channel_capacity() -> u32 {
    1024
}

/// Connection settings for the NATS message transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsConfig {
    /// Comma-separated list of NATS server URLs.
    pub urls: String,

    /// Subject on which periodic statistics are published. Statistics are
    /// written to the log when unset.
    #[serde(default)]
    pub stats_subject: Option<String>,

    /// Optional token for NATS authentication.
    #[serde(default)]
    pub token: Option<String>,
}

/// A sensor station and the subject its detections are published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Station identifier used in statistics and logs.
    pub id: String,

    /// Subject carrying the station's detection events.
    pub subject: String,
}

/// Application configuration for Perch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Location of the persisted gate state.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Path to the species rarity table, resolved against the config
    /// directory.
    #[serde(skip)]
    pub species_path: PathBuf,

    /// How often the species table is checked for changes.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds",
        default = "default_species_reload_interval"
    )]
    pub species_reload_interval_secs: Duration,

    /// How often gate state is saved.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds",
        default = "default_persist_interval"
    )]
    pub persist_interval_secs: Duration,

    /// How often statistics are emitted.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds",
        default = "default_stats_interval"
    )]
    pub stats_interval_secs: Duration,

    /// The maximum time to wait for graceful shutdown.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout: Duration,

    /// Capacity of the channel feeding the gate from all stations.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: u32,

    /// Message transport settings.
    #[serde(default)]
    pub nats: Option<NatsConfig>,

    /// Stations to subscribe to.
    #[serde(default)]
    pub stations: Vec<StationConfig>,

    /// Display channel settings.
    #[serde(default)]
    pub display: DisplayConfig,

    /// Decision engine settings.
    #[serde(default)]
    pub gate: GateConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            species_path: PathBuf::from("configs/species.yaml"),
            species_reload_interval_secs: default_species_reload_interval(),
            persist_interval_secs: default_persist_interval(),
            stats_interval_secs: default_stats_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            event_channel_capacity: default_event_channel_capacity(),
            nats: None,
            stations: Vec::new(),
            display: DisplayConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new `AppConfig` by reading from the configuration directory.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir_str = config_dir.unwrap_or("configs");
        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/app.yaml", config_dir_str)))
            .add_source(Environment::with_prefix("PERCH").separator("__"))
            .build()?;
        let mut config: Self = s.try_deserialize()?;

        config.validate().map_err(|e| ConfigError::Message(e.to_string()))?;

        let config_path = Path::new(config_dir_str);
        config.species_path = config_path.join("species.yaml");

        Ok(config)
    }

    /// Checks the settings that must be non-zero and the gate tuning.
    pub fn validate(&self) -> Result<(), AppConfigError> {
        let required = [
            ("persist_interval_secs", self.persist_interval_secs),
            ("stats_interval_secs", self.stats_interval_secs),
            ("shutdown_timeout", self.shutdown_timeout),
            ("display.timeout_ms", self.display.timeout_ms),
        ];
        if let Some(&(name, _)) = required.iter().find(|(_, value)| value.is_zero()) {
            return Err(AppConfigError::ZeroDuration(name));
        }
        self.gate.validate()?;
        Ok(())
    }

    /// Creates a new `AppConfigBuilder` for tests.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }
}

/// A builder for creating `AppConfig` instances in tests.
#[derive(Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Sets the state file location.
    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.state_path = path.into();
        self
    }

    /// Sets the species table location.
    pub fn species_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.species_path = path.into();
        self
    }

    /// Sets the persistence interval.
    pub fn persist_interval(mut self, interval: Duration) -> Self {
        self.config.persist_interval_secs = interval;
        self
    }

    /// Sets the statistics interval.
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.config.stats_interval_secs = interval;
        self
    }

    /// Sets the gate configuration.
    pub fn gate(mut self, gate: GateConfig) -> Self {
        self.config.gate = gate;
        self
    }

    /// Sets the display configuration.
    pub fn display(mut self, display: DisplayConfig) -> Self {
        self.config.display = display;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> AppConfig {
        self.config
    }
}
