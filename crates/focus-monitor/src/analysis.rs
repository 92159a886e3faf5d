//! Per-frame analysis results

use serde::Serialize;

use crate::emotion::Emotion;
use crate::stabilizer::{EmotionLabel, FocusStatus};

/// Eye openness readings of one iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EarReading {
    pub left: f32,
    pub right: f32,
    pub average: f32,
    /// EMA after this iteration
    pub smoothed: f32,
}

/// Complete result of one loop iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameAnalysis {
    /// Whether a face was detected
    pub face_detected: bool,

    /// Eye readings (only with a face)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ear: Option<EarReading>,

    pub drowsy: bool,

    /// This iteration's observation
    pub observation: EmotionLabel,

    /// Classifier confidence for `observation`, 0-100
    pub confidence: f32,

    /// Majority-vote emotion over the buffer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_emotion: Option<Emotion>,

    pub status: FocusStatus,
}

impl FrameAnalysis {
    /// Result for a frame without a face
    pub fn no_face(stable_emotion: Option<Emotion>, status: FocusStatus) -> Self {
        Self {
            face_detected: false,
            ear: None,
            drowsy: false,
            observation: EmotionLabel::NoFace,
            confidence: 0.0,
            stable_emotion,
            status,
        }
    }
}
