//! Agent settings: optional TOML file layered under `FOCUS_EDGE_*` variables

use camera_capture::CameraConfig;
use cloud_sync::CloudConfig;
use config::{Config, Environment, File, FileFormat};
use focus_monitor::FocusConfig;
use sense_hat::SenseHatConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default settings file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "focus-edge.toml";
/// Environment variable naming the settings file
pub const CONFIG_PATH_VAR: &str = "FOCUS_EDGE_CONFIG";
const ENV_PREFIX: &str = "FOCUS_EDGE";

/// Settings error types
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics exporter setup failed: {0}")]
    Metrics(String),
}

/// Capture loop timing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Minimum time between two reports (seconds)
    pub report_interval_secs: u64,
    /// Wait after a failed camera open (milliseconds)
    pub open_retry_ms: u64,
    /// Wait after a failed frame read (milliseconds)
    pub read_retry_ms: u64,
    /// Warm-up delay before the camera is first opened (seconds)
    pub startup_delay_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
            open_retry_ms: 2000,
            read_retry_ms: 1000,
            startup_delay_secs: 0,
        }
    }
}

impl AgentSettings {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn open_retry(&self) -> Duration {
        Duration::from_millis(self.open_retry_ms)
    }

    pub fn read_retry(&self) -> Duration {
        Duration::from_millis(self.read_retry_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Serve Prometheus metrics here when set
    pub prometheus_addr: Option<SocketAddr>,
}

/// Complete agent settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub agent: AgentSettings,
    pub camera: CameraConfig,
    pub focus: FocusConfig,
    pub cloud: CloudConfig,
    pub sense_hat: SenseHatConfig,
    pub logging: LoggingSettings,
    pub telemetry: TelemetrySettings,
}

/// Settings file location: first CLI argument, then `FOCUS_EDGE_CONFIG`,
/// then [`DEFAULT_CONFIG_FILE`]. The flag tells whether it was asked for
/// explicitly (and so must exist).
pub fn config_path(
    mut args: impl Iterator<Item = String>,
    env_value: Option<String>,
) -> (PathBuf, bool) {
    match args.next().or(env_value) {
        Some(path) if !path.is_empty() => (PathBuf::from(path), true),
        _ => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    }
}

impl Settings {
    /// Load from `path` and the process environment, then validate
    pub fn load(path: &Path, required: bool) -> Result<Self, SettingsError> {
        Self::load_with_env(path, required, None)
    }

    /// Like [`Settings::load`] with an explicit environment map
    /// (`None` reads the process environment)
    pub fn load_with_env(
        path: &Path,
        required: bool,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, SettingsError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.focus
            .validate()
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;
        self.cloud
            .validate()
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;

        if self.agent.report_interval_secs < 1 {
            return Err(SettingsError::Invalid(
                "agent.report_interval_secs must be at least 1".into(),
            ));
        }
        if self.camera.fps == 0 || self.camera.width == 0 || self.camera.height == 0 {
            return Err(SettingsError::Invalid(
                "camera fps and resolution must be positive".into(),
            ));
        }
        if self.sense_hat.temperature_factor <= 0.0 {
            return Err(SettingsError::Invalid(
                "sense_hat.temperature_factor must be positive".into(),
            ));
        }
        Ok(())
    }
}
