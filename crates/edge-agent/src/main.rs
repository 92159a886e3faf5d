//! Focus Tracking Edge Agent - Main Entry Point

use anyhow::Context;
use camera_capture::{open_backend, FrameSource};
use cloud_sync::{channel, CloudClient, ReportWorker};
use edge_agent::settings::CONFIG_PATH_VAR;
use edge_agent::{config_path, init_logging, init_metrics, listen_for_signals, Orchestrator, Settings, Shutdown};
use focus_monitor::OnnxFocusMonitor;
use sense_hat::Peripheral;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (path, required) = config_path(std::env::args().skip(1), std::env::var(CONFIG_PATH_VAR).ok());
    let settings = Settings::load(&path, required)
        .with_context(|| format!("loading settings from {}", path.display()))?;

    init_logging(&settings.logging)?;
    info!("=== Focus Edge Agent v{} ===", env!("CARGO_PKG_VERSION"));
    debug!(?settings, "Effective settings");
    init_metrics(&settings.telemetry)?;

    let shutdown = Shutdown::new();
    tokio::spawn(listen_for_signals(shutdown.clone()));

    let delay = settings.agent.startup_delay();
    if !delay.is_zero() {
        info!("Waiting {:?} before starting", delay);
        let waiter = shutdown.clone();
        tokio::task::spawn_blocking(move || waiter.wait_timeout(delay)).await?;
        if shutdown.is_triggered() {
            return Ok(());
        }
    }

    info!("Loading models");
    let monitor = OnnxFocusMonitor::load(settings.focus.clone()).context("loading focus models")?;
    let backend = open_backend(&settings.camera).context("selecting camera backend")?;
    info!(camera = %backend.describe(), "Camera backend ready");

    let peripheral = Peripheral::detect(&settings.sense_hat);

    let client = CloudClient::new(settings.cloud.clone()).context("creating cloud client")?;
    let (queue, rx) = channel(settings.cloud.queue_capacity);
    let worker = ReportWorker::spawn(client, rx, settings.cloud.max_report_age());

    let mut orchestrator = Orchestrator::new(
        FrameSource::new(backend),
        monitor,
        peripheral,
        queue,
        settings.agent.clone(),
    );
    let loop_shutdown = shutdown.clone();
    // Dropping the orchestrator closes the report queue
    tokio::task::spawn_blocking(move || orchestrator.run(&loop_shutdown))
        .await
        .context("capture loop panicked")?;

    if let Some(stats) = worker.finish(settings.cloud.shutdown_grace()).await {
        info!(sent = stats.sent, failed = stats.failed, stale = stats.stale, "Reports flushed");
    }
    info!("Shutdown complete");
    Ok(())
}
