//! Cloud Synchronization Module
//!
//! Focus status reporting to the ingestion backend:
//! - Authenticated JSON POST with a hard timeout
//! - Backend response classification
//! - Bounded background queue so the capture loop never waits on the network

mod client;
mod worker;

pub use client::CloudClient;
pub use worker::{channel, ReportQueue, ReportSink, ReportWorker, WorkerStats};

use focus_monitor::{EmotionLabel, FocusStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Cloud sync error types
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("API key missing or not registered")]
    Unauthorized,

    #[error("No active session for this device")]
    NoActiveSession,

    #[error("Multiple active sessions for this device")]
    SessionConflict,

    #[error("Report rejected: {0}")]
    Rejected(String),

    #[error("Server error: HTTP {0}")]
    Server(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CloudError {
    /// Short label for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            CloudError::Unauthorized => "unauthorized",
            CloudError::NoActiveSession => "no_session",
            CloudError::SessionConflict => "session_conflict",
            CloudError::Rejected(_) => "rejected",
            CloudError::Server(_) => "server_error",
            CloudError::Timeout => "timeout",
            CloudError::Network(_) => "network",
            CloudError::Client(_) | CloudError::Config(_) => "client",
        }
    }
}

/// Reporting configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Ingestion endpoint
    pub api_url: String,
    /// Device secret sent in the `API-Key` header
    pub api_key: String,
    /// Hard timeout for one report (milliseconds)
    pub timeout_ms: u64,
    /// Reports waiting for the worker
    pub queue_capacity: usize,
    /// Reports older than this when dequeued are discarded (seconds)
    pub max_report_age_secs: u64,
    /// Time given to the worker to flush on shutdown (milliseconds)
    pub shutdown_grace_ms: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api/log_focus/".to_string(),
            api_key: String::new(),
            timeout_ms: 2000,
            queue_capacity: 8,
            max_report_age_secs: 120,
            shutdown_grace_ms: 3000,
        }
    }
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("queue_capacity", &self.queue_capacity)
            .field("max_report_age_secs", &self.max_report_age_secs)
            .field("shutdown_grace_ms", &self.shutdown_grace_ms)
            .finish()
    }
}

impl CloudConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_report_age(&self) -> Duration {
        Duration::from_secs(self.max_report_age_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<(), CloudError> {
        if self.api_url.trim().is_empty() {
            return Err(CloudError::Config("api_url must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(CloudError::Config("timeout_ms must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(CloudError::Config("queue_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// One status report as posted to the backend
#[derive(Debug, Clone, Serialize)]
pub struct FocusReport {
    pub status: FocusStatus,
    pub emotion_detected: EmotionLabel,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    /// When the loop produced the report
    #[serde(skip)]
    pub created: Instant,
}

impl FocusReport {
    pub fn new(
        status: FocusStatus,
        emotion_detected: EmotionLabel,
        temperature: Option<f32>,
        humidity: Option<f32>,
    ) -> Self {
        Self {
            status,
            emotion_detected,
            temperature,
            humidity,
            created: Instant::now(),
        }
    }
}
