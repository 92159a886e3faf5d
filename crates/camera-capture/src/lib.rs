//! Camera Capture Library for the focus edge agent
//!
//! Provides camera frame acquisition behind a small backend trait:
//! - Snapshot backend (newest frame written by an external capture process)
//! - Native V4L2 backend through the C camera driver (`v4l2` feature)
//! - [`FrameSource`]: lazy open, explicit release, never raises on camera faults

#[cfg(feature = "v4l2")]
pub mod ffi;
pub mod frame;
pub mod snapshot;
pub mod source;

pub use frame::{Region, VideoFrame};
pub use snapshot::SnapshotCamera;
pub use source::{CaptureStage, FrameSource, Unavailable};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture timeout")]
    Timeout,

    #[error("Camera not initialized")]
    NotInitialized,

    #[error("Backend not available in this build: {0}")]
    Unsupported(String),
}

/// Capture backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// Poll the newest still frame written by an external capture process
    Snapshot,
    /// Native V4L2 capture (requires the `v4l2` feature)
    V4l2,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture backend
    pub backend: CameraBackend,
    /// Camera index (`/dev/video{index}`)
    pub index: u32,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// Frame file polled by the snapshot backend
    pub snapshot_path: PathBuf,
    /// A read that yields no fresh frame within this window fails (milliseconds)
    pub read_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::Snapshot,
            index: 0,
            width: 640,
            height: 480,
            fps: 15,
            snapshot_path: PathBuf::from("/dev/shm/focus-edge/frame.jpg"),
            read_timeout_ms: 1000,
        }
    }
}

impl CameraConfig {
    /// Device node for the configured index
    pub fn device_path(&self) -> String {
        format!("/dev/video{}", self.index)
    }

    /// Nominal time between two frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.fps.max(1) as u64)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// A camera that can be (re)opened any number of times.
pub trait CaptureBackend: Send {
    /// Human readable description for logs
    fn describe(&self) -> String;

    /// Open the device. Dropping the returned handle releases it.
    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, CameraError>;
}

/// An open camera handle.
pub trait CaptureHandle: Send {
    /// Read the next frame
    fn read(&mut self) -> Result<VideoFrame, CameraError>;
}

/// Build the backend selected in `config`
pub fn open_backend(config: &CameraConfig) -> Result<Box<dyn CaptureBackend>, CameraError> {
    match config.backend {
        CameraBackend::Snapshot => Ok(Box::new(SnapshotCamera::new(config))),
        #[cfg(feature = "v4l2")]
        CameraBackend::V4l2 => Ok(Box::new(ffi::V4l2Camera::new(config.clone()))),
        #[cfg(not(feature = "v4l2"))]
        CameraBackend::V4l2 => Err(CameraError::Unsupported(
            "v4l2 backend requires the `v4l2` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path_and_interval() {
        let config = CameraConfig {
            index: 2,
            fps: 20,
            ..Default::default()
        };
        assert_eq!(config.device_path(), "/dev/video2");
        assert_eq!(config.frame_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_snapshot_backend_selected_by_default() {
        let backend = open_backend(&CameraConfig::default()).unwrap();
        assert!(backend.describe().contains("snapshot"));
    }

    #[cfg(not(feature = "v4l2"))]
    #[test]
    fn test_v4l2_requires_feature() {
        let config = CameraConfig {
            backend: CameraBackend::V4l2,
            ..Default::default()
        };
        assert!(matches!(open_backend(&config), Err(CameraError::Unsupported(_))));
    }
}
