//! FFI bindings for the native V4L2 camera driver (libfocus_camera)

use libc::{c_char, c_int};
use std::ffi::{CStr, CString};

use crate::{CameraConfig, CameraError, CaptureBackend, CaptureHandle, VideoFrame};

/// C pixel format enum
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CPixelFormat {
    Rgb24 = 0,
    Mjpeg = 1,
}

/// C video frame structure (matches focus_camera.h)
#[repr(C)]
pub struct CVideoFrame {
    pub data: *mut u8,
    pub size: usize,
    pub width: u32,
    pub height: u32,
    pub format: CPixelFormat,
    pub timestamp_ns: u64,
    pub sequence: u32,
}

/// C camera configuration
#[repr(C)]
pub struct CCameraConfig {
    pub device: *const c_char,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: CPixelFormat,
    pub buffer_count: c_int,
}

#[link(name = "focus_camera")]
extern "C" {
    fn focus_camera_init(config: *const CCameraConfig) -> c_int;
    fn focus_camera_start() -> c_int;
    fn focus_camera_stop();
    fn focus_camera_shutdown();
    fn focus_camera_read_frame(timeout_ms: c_int) -> *mut CVideoFrame;
    fn focus_camera_release_frame(frame: *mut CVideoFrame);
    fn focus_camera_last_error() -> *const c_char;
}

fn last_error() -> String {
    // SAFETY: the driver returns either NULL or a static NUL-terminated string
    unsafe {
        let ptr = focus_camera_last_error();
        if ptr.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

/// V4L2 camera backend
pub struct V4l2Camera {
    config: CameraConfig,
}

impl V4l2Camera {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

impl CaptureBackend for V4l2Camera {
    fn describe(&self) -> String {
        format!("v4l2:{}", self.config.device_path())
    }

    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, CameraError> {
        let driver = CameraDriver::new(&self.config)?;
        driver.start()?;
        Ok(Box::new(V4l2Handle {
            driver,
            timeout_ms: self.config.read_timeout_ms.min(c_int::MAX as u64) as c_int,
        }))
    }
}

struct V4l2Handle {
    driver: CameraDriver,
    timeout_ms: c_int,
}

impl CaptureHandle for V4l2Handle {
    fn read(&mut self) -> Result<VideoFrame, CameraError> {
        let captured = self
            .driver
            .read_frame(self.timeout_ms)
            .ok_or(CameraError::Timeout)?;
        captured.to_video_frame()
    }
}

/// Camera driver wrapper; shuts the device down on drop
struct CameraDriver {
    _device: CString,
}

impl CameraDriver {
    fn new(config: &CameraConfig) -> Result<Self, CameraError> {
        let device = CString::new(config.device_path())
            .map_err(|e| CameraError::Open(e.to_string()))?;

        let c_config = CCameraConfig {
            device: device.as_ptr(),
            width: config.width,
            height: config.height,
            fps: config.fps,
            format: CPixelFormat::Mjpeg,
            buffer_count: 4,
        };

        let ret = unsafe { focus_camera_init(&c_config) };
        if ret != 0 {
            return Err(CameraError::Open(format!("Init failed ({}): {}", ret, last_error())));
        }

        Ok(Self { _device: device })
    }

    fn start(&self) -> Result<(), CameraError> {
        let ret = unsafe { focus_camera_start() };
        if ret != 0 {
            Err(CameraError::Stream(format!("Start failed ({}): {}", ret, last_error())))
        } else {
            Ok(())
        }
    }

    fn read_frame(&self, timeout_ms: c_int) -> Option<CapturedFrame> {
        let ptr = unsafe { focus_camera_read_frame(timeout_ms) };
        if ptr.is_null() {
            None
        } else {
            Some(CapturedFrame { ptr })
        }
    }
}

impl Drop for CameraDriver {
    fn drop(&mut self) {
        unsafe {
            focus_camera_stop();
            focus_camera_shutdown();
        }
    }
}

/// Driver-owned frame buffer, handed back on drop
struct CapturedFrame {
    ptr: *mut CVideoFrame,
}

impl CapturedFrame {
    fn to_video_frame(&self) -> Result<VideoFrame, CameraError> {
        // SAFETY: ptr is non-null and valid until release_frame
        let frame = unsafe { &*self.ptr };
        let data = unsafe { std::slice::from_raw_parts(frame.data, frame.size) };

        match frame.format {
            CPixelFormat::Mjpeg => VideoFrame::decode(data, frame.timestamp_ns, frame.sequence),
            CPixelFormat::Rgb24 => {
                let out = VideoFrame::new(
                    data.to_vec(),
                    frame.width,
                    frame.height,
                    frame.timestamp_ns,
                    frame.sequence,
                );
                if out.is_valid() {
                    Ok(out)
                } else {
                    Err(CameraError::Format(format!(
                        "RGB24 buffer of {} bytes for {}x{}",
                        frame.size, frame.width, frame.height
                    )))
                }
            }
        }
    }
}

impl Drop for CapturedFrame {
    fn drop(&mut self) {
        unsafe { focus_camera_release_frame(self.ptr) };
    }
}

// The driver serialises access internally; frames may cross threads
unsafe impl Send for CapturedFrame {}
