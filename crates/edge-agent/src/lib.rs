//! Focus Tracking Edge Agent
//!
//! Wires the camera, the focus monitor, the Sense HAT indicator and the
//! cloud reporter into one capture loop.

pub mod orchestrator;
pub mod settings;
pub mod shutdown;

pub use orchestrator::{CameraState, Orchestrator, StepOutcome};
pub use settings::{config_path, LogFormat, LoggingSettings, Settings, SettingsError, TelemetrySettings};
pub use shutdown::{listen_for_signals, Shutdown};

use metrics_exporter_prometheus::PrometheusBuilder;
use std::str::FromStr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Parse a log level name (case-insensitive)
pub fn parse_level(level: &str) -> Result<Level, SettingsError> {
    Level::from_str(level.trim())
        .map_err(|_| SettingsError::Invalid(format!("unknown log level '{}'", level)))
}

/// Install the global tracing subscriber
pub fn init_logging(settings: &LoggingSettings) -> Result<(), SettingsError> {
    let level = parse_level(&settings.level)?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = match settings.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    result.map_err(|e| SettingsError::Logging(e.to_string()))
}

/// Start the Prometheus exporter when an address is configured.
/// Must be called from within the tokio runtime.
pub fn init_metrics(settings: &TelemetrySettings) -> Result<(), SettingsError> {
    let Some(addr) = settings.prometheus_addr else {
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| SettingsError::Metrics(e.to_string()))?;

    info!("Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}
