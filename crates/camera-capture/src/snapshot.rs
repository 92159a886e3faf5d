//! Snapshot capture backend
//!
//! Reads the newest still an external capture process keeps rewriting
//! (e.g. `rpicam-still --timelapse` or `ffmpeg -update 1` into `/dev/shm`).
//! A frame that is not refreshed within the read timeout counts as a read
//! failure, so a dead capture process looks like an unplugged camera.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::{CameraConfig, CameraError, CaptureBackend, CaptureHandle, VideoFrame};

/// Snapshot-file camera
#[derive(Debug, Clone)]
pub struct SnapshotCamera {
    path: PathBuf,
    read_timeout: Duration,
    poll_interval: Duration,
}

impl SnapshotCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            path: config.snapshot_path.clone(),
            read_timeout: config.read_timeout(),
            // Poll at twice the frame rate
            poll_interval: config.frame_interval() / 2,
        }
    }
}

impl CaptureBackend for SnapshotCamera {
    fn describe(&self) -> String {
        format!("snapshot:{}", self.path.display())
    }

    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, CameraError> {
        fs::metadata(&self.path)
            .map_err(|e| CameraError::Open(format!("{}: {}", self.path.display(), e)))?;

        Ok(Box::new(SnapshotHandle {
            path: self.path.clone(),
            read_timeout: self.read_timeout,
            poll_interval: self.poll_interval,
            last_modified: None,
            sequence: 0,
        }))
    }
}

struct SnapshotHandle {
    path: PathBuf,
    read_timeout: Duration,
    poll_interval: Duration,
    last_modified: Option<SystemTime>,
    sequence: u32,
}

impl CaptureHandle for SnapshotHandle {
    fn read(&mut self) -> Result<VideoFrame, CameraError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut last_error = CameraError::Timeout;

        loop {
            let modified = fs::metadata(&self.path)
                .and_then(|m| m.modified())
                .map_err(|e| CameraError::Stream(format!("{}: {}", self.path.display(), e)))?;

            if self.last_modified != Some(modified) {
                let bytes = fs::read(&self.path)
                    .map_err(|e| CameraError::Stream(format!("{}: {}", self.path.display(), e)))?;
                let timestamp_ns = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);

                match VideoFrame::decode(&bytes, timestamp_ns, self.sequence) {
                    Ok(frame) => {
                        self.last_modified = Some(modified);
                        self.sequence = self.sequence.wrapping_add(1);
                        return Ok(frame);
                    }
                    // Possibly caught mid-write; poll again
                    Err(e) => {
                        debug!("Snapshot not decodable yet: {}", e);
                        last_error = e;
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(last_error);
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs::File;

    fn write_png(path: &std::path::Path, colour: [u8; 3], modified: SystemTime) {
        let img = RgbImage::from_pixel(8, 6, Rgb(colour));
        img.save_with_format(path, image::ImageFormat::Png).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    fn config(path: PathBuf) -> CameraConfig {
        CameraConfig {
            snapshot_path: path,
            read_timeout_ms: 60,
            fps: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut camera = SnapshotCamera::new(&config(dir.path().join("missing.png")));
        assert!(matches!(camera.open(), Err(CameraError::Open(_))));
    }

    #[test]
    fn test_reads_fresh_frames_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let t0 = SystemTime::now();
        write_png(&path, [9, 9, 9], t0);

        let mut camera = SnapshotCamera::new(&config(path.clone()));
        let mut handle = camera.open().unwrap();

        let first = handle.read().unwrap();
        assert_eq!(first.dimensions(), (8, 6));
        assert_eq!(first.get_pixel(0, 0), Some([9, 9, 9]));
        assert_eq!(first.sequence, 0);

        // Same file again: stale
        assert!(matches!(handle.read(), Err(CameraError::Timeout)));

        write_png(&path, [1, 2, 3], t0 + Duration::from_secs(5));
        let second = handle.read().unwrap();
        assert_eq!(second.get_pixel(0, 0), Some([1, 2, 3]));
        assert_eq!(second.sequence, 1);
    }

    #[test]
    fn test_vanished_file_is_stream_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        write_png(&path, [0, 0, 0], SystemTime::now());

        let mut camera = SnapshotCamera::new(&config(path.clone()));
        let mut handle = camera.open().unwrap();
        fs::remove_file(&path).unwrap();

        assert!(matches!(handle.read(), Err(CameraError::Stream(_))));
    }
}
