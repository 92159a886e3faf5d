//! Capture loop: camera fault recovery, per-frame analysis, periodic reports

use camera_capture::{CaptureStage, FrameSource};
use cloud_sync::{FocusReport, ReportSink};
use focus_monitor::{EmotionClassifier, FocusMonitor, FrameAnalysis, LandmarkExtractor};
use metrics::{counter, gauge};
use sense_hat::Peripheral;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::settings::AgentSettings;
use crate::shutdown::Shutdown;

/// Camera connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Disconnected,
    Connected,
}

/// What one loop iteration did
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A frame was analyzed
    Analyzed(FrameAnalysis),
    /// No frame; the camera was released and should be retried after `backoff`
    Unavailable {
        stage: CaptureStage,
        backoff: Duration,
    },
}

/// Owns the camera, the models, the indicator and the report queue for the
/// lifetime of the process. Single-threaded: one frame in flight at a time.
pub struct Orchestrator<L, C, S> {
    source: FrameSource,
    monitor: FocusMonitor<L, C>,
    peripheral: Peripheral,
    sink: S,
    settings: AgentSettings,
    state: CameraState,
    last_report: Option<Instant>,
}

impl<L, C, S> Orchestrator<L, C, S>
where
    L: LandmarkExtractor,
    C: EmotionClassifier,
    S: ReportSink,
{
    pub fn new(
        source: FrameSource,
        monitor: FocusMonitor<L, C>,
        peripheral: Peripheral,
        sink: S,
        settings: AgentSettings,
    ) -> Self {
        Self {
            source,
            monitor,
            peripheral,
            sink,
            settings,
            state: CameraState::Disconnected,
            last_report: None,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn monitor(&self) -> &FocusMonitor<L, C> {
        &self.monitor
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one iteration at time `now`
    pub fn step(&mut self, now: Instant) -> StepOutcome {
        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(unavailable) => {
                if self.state == CameraState::Connected {
                    warn!(error = %unavailable, "Camera stream lost, retrying");
                    counter!("focus_camera_disconnects_total").increment(1);
                } else {
                    debug!(error = %unavailable, "Camera not available");
                }

                self.source.release();
                self.state = CameraState::Disconnected;
                if let Err(e) = self.peripheral.clear() {
                    warn!("Failed to clear indicator: {}", e);
                }

                let backoff = match unavailable.stage {
                    CaptureStage::Open => self.settings.open_retry(),
                    CaptureStage::Read => self.settings.read_retry(),
                };
                return StepOutcome::Unavailable {
                    stage: unavailable.stage,
                    backoff,
                };
            }
        };

        if self.state == CameraState::Disconnected {
            info!(
                width = frame.width,
                height = frame.height,
                "Camera connected"
            );
            self.state = CameraState::Connected;
        }

        let analysis = self.monitor.analyze(&frame);
        counter!("focus_frames_total").increment(1);
        if let Some(ear) = &analysis.ear {
            gauge!("focus_smoothed_ear").set(ear.smoothed as f64);
        }

        if let Err(e) = self.peripheral.set_status(analysis.status) {
            warn!("Failed to update indicator: {}", e);
        }

        if self.report_due(now) {
            self.report(&analysis);
            self.last_report = Some(now);
        }

        StepOutcome::Analyzed(analysis)
    }

    fn report_due(&self, now: Instant) -> bool {
        match self.last_report {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.settings.report_interval(),
        }
    }

    fn report(&mut self, analysis: &FrameAnalysis) {
        let environment = self.peripheral.read_environment();
        info!(
            status = %analysis.status,
            emotion = %analysis.observation,
            confidence = analysis.confidence,
            temperature = ?environment.temperature,
            humidity = ?environment.humidity,
            "Queueing report"
        );

        let report = FocusReport::new(
            analysis.status,
            analysis.observation,
            environment.temperature,
            environment.humidity,
        );
        self.sink.submit(report);
    }

    /// Loop until `shutdown` fires, then release the camera and indicator
    pub fn run(&mut self, shutdown: &Shutdown) {
        info!("System ready, waiting for camera");

        while !shutdown.is_triggered() {
            if let StepOutcome::Unavailable { backoff, .. } = self.step(Instant::now()) {
                if shutdown.wait_timeout(backoff) {
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Release the camera handle and blank the indicator
    pub fn shutdown(&mut self) {
        self.source.release();
        self.state = CameraState::Disconnected;
        if let Err(e) = self.peripheral.clear() {
            warn!("Failed to clear indicator on shutdown: {}", e);
        }
        info!("Camera and indicator released");
    }
}
