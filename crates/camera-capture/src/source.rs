//! Frame source: owns the camera handle lifecycle

use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::{CameraError, CaptureBackend, CaptureHandle, VideoFrame};

/// Where a capture attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Open,
    Read,
}

impl fmt::Display for CaptureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStage::Open => f.write_str("open"),
            CaptureStage::Read => f.write_str("read"),
        }
    }
}

/// No frame this time. The caller decides when to release and retry.
#[derive(Error, Debug)]
#[error("camera unavailable ({stage}): {reason}")]
pub struct Unavailable {
    pub stage: CaptureStage,
    pub reason: CameraError,
}

/// Lazily opened camera. Never panics and never blocks past the backend's
/// read timeout.
pub struct FrameSource {
    backend: Box<dyn CaptureBackend>,
    handle: Option<Box<dyn CaptureHandle>>,
    open_count: u64,
}

impl FrameSource {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            handle: None,
            open_count: 0,
        }
    }

    /// Whether a camera handle is currently held
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Number of successful opens so far
    pub fn open_count(&self) -> u64 {
        self.open_count
    }

    /// Next frame, opening the camera first if needed
    pub fn next_frame(&mut self) -> Result<VideoFrame, Unavailable> {
        if self.handle.is_none() {
            let handle = self.backend.open().map_err(|reason| Unavailable {
                stage: CaptureStage::Open,
                reason,
            })?;
            self.open_count += 1;
            info!(backend = %self.backend.describe(), "Camera opened");
            self.handle = Some(handle);
        }

        let Some(handle) = self.handle.as_mut() else {
            return Err(Unavailable {
                stage: CaptureStage::Open,
                reason: CameraError::NotInitialized,
            });
        };

        handle.read().map_err(|reason| Unavailable {
            stage: CaptureStage::Read,
            reason,
        })
    }

    /// Drop the camera handle (no-op when closed)
    pub fn release(&mut self) {
        if self.handle.take().is_some() {
            debug!(backend = %self.backend.describe(), "Camera released");
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counters {
        opens: AtomicUsize,
        releases: AtomicUsize,
    }

    struct FakeBackend {
        counters: Arc<Counters>,
        open_results: VecDeque<bool>,
        reads: Arc<std::sync::Mutex<VecDeque<bool>>>,
    }

    struct FakeHandle {
        counters: Arc<Counters>,
        reads: Arc<std::sync::Mutex<VecDeque<bool>>>,
    }

    impl CaptureBackend for FakeBackend {
        fn describe(&self) -> String {
            "fake".to_string()
        }

        fn open(&mut self) -> Result<Box<dyn CaptureHandle>, CameraError> {
            if !self.open_results.pop_front().unwrap_or(true) {
                return Err(CameraError::Open("unplugged".into()));
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeHandle {
                counters: self.counters.clone(),
                reads: self.reads.clone(),
            }))
        }
    }

    impl CaptureHandle for FakeHandle {
        fn read(&mut self) -> Result<VideoFrame, CameraError> {
            if self.reads.lock().unwrap().pop_front().unwrap_or(true) {
                Ok(VideoFrame::filled(4, 4, [0, 0, 0]))
            } else {
                Err(CameraError::Timeout)
            }
        }
    }

    impl Drop for FakeHandle {
        fn drop(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn source(opens: &[bool], reads: &[bool]) -> (FrameSource, Arc<Counters>) {
        let counters = Arc::new(Counters {
            opens: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        });
        let backend = FakeBackend {
            counters: counters.clone(),
            open_results: opens.iter().copied().collect(),
            reads: Arc::new(std::sync::Mutex::new(reads.iter().copied().collect())),
        };
        (FrameSource::new(Box::new(backend)), counters)
    }

    #[test]
    fn test_lazy_open_on_first_frame() {
        let (mut source, counters) = source(&[], &[]);
        assert!(!source.is_open());

        assert!(source.next_frame().is_ok());
        assert!(source.is_open());
        assert!(source.next_frame().is_ok());
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(source.open_count(), 1);
    }

    #[test]
    fn test_open_failure_is_unavailable() {
        let (mut source, _) = source(&[false], &[]);
        let err = source.next_frame().unwrap_err();
        assert_eq!(err.stage, CaptureStage::Open);
        assert!(!source.is_open());

        // Next attempt opens again
        assert!(source.next_frame().is_ok());
    }

    #[test]
    fn test_read_failure_keeps_handle_until_released() {
        let (mut source, counters) = source(&[], &[false]);
        let err = source.next_frame().unwrap_err();
        assert_eq!(err.stage, CaptureStage::Read);
        assert!(source.is_open());

        source.release();
        assert!(!source.is_open());
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);

        // Releasing twice is harmless
        source.release();
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_handle() {
        let (mut source, counters) = source(&[], &[]);
        source.next_frame().unwrap();
        drop(source);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }
}
