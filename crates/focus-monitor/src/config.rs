//! Focus monitor configuration

use inference_engine::InputScaling;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::emotion::Emotion;
use crate::FocusError;

/// How the emotion model's first output should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Already a probability vector (softmax inside the model)
    #[default]
    Probabilities,
    /// Raw scores; softmax is applied before arg-max
    Logits,
}

/// Face-mesh (landmark) model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceMeshConfig {
    pub model_path: PathBuf,
    /// Face score needed on a full-frame pass
    pub min_detection_confidence: f32,
    /// Face score needed to keep tracking inside the previous region
    pub min_tracking_confidence: f32,
    /// Expect iris-refined (478 point) output
    pub refine_landmarks: bool,
    pub input_scaling: InputScaling,
}

impl Default for FaceMeshConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/face_landmark.onnx"),
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            refine_landmarks: true,
            input_scaling: InputScaling::Unit,
        }
    }
}

/// Emotion classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionModelConfig {
    pub model_path: PathBuf,
    /// Range the model was trained on; raw 0-255 for the deployed model
    pub input_scaling: InputScaling,
    pub output: OutputKind,
}

impl Default for EmotionModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/emotion_model.onnx"),
            input_scaling: InputScaling::Raw,
            output: OutputKind::Probabilities,
        }
    }
}

/// Focus monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    /// Smoothed EAR below this counts as eyes closed
    pub ear_threshold: f32,

    /// Consecutive closed iterations before the drowsy flag is raised
    pub drowsy_consecutive_frames: u32,

    /// EMA smoothing factor for the averaged EAR
    pub ema_alpha: f32,

    /// Emotion buffer capacity (majority-vote window)
    pub emotion_buffer_capacity: usize,

    /// Pixels added around the landmark bounding box before cropping
    pub crop_margin_px: u32,

    /// Stable emotions that count as FOCUSED; everything else is DISTRACTED
    pub focused_emotions: Vec<Emotion>,

    pub face_mesh: FaceMeshConfig,
    pub emotion_model: EmotionModelConfig,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.20,
            drowsy_consecutive_frames: 25,
            ema_alpha: 0.3,
            emotion_buffer_capacity: 150,
            crop_margin_px: 20,
            focused_emotions: vec![Emotion::Neutral, Emotion::Happy, Emotion::Surprise],
            face_mesh: FaceMeshConfig::default(),
            emotion_model: EmotionModelConfig::default(),
        }
    }
}

impl FocusConfig {
    /// Create sensitive config (earlier drowsiness alarm, shorter vote window)
    pub fn sensitive() -> Self {
        Self {
            ear_threshold: 0.25,
            drowsy_consecutive_frames: 15,
            emotion_buffer_capacity: 90,
            ..Default::default()
        }
    }

    /// Create relaxed config (later drowsiness alarm, longer vote window)
    pub fn relaxed() -> Self {
        Self {
            ear_threshold: 0.18,
            drowsy_consecutive_frames: 40,
            emotion_buffer_capacity: 300,
            ..Default::default()
        }
    }

    /// Derive the consecutive-frame threshold from a camera rate and the
    /// eye closure duration that should raise the alarm
    pub fn for_frame_rate(fps: u32, closure_ms: u64) -> Self {
        let frames = ((fps as u64 * closure_ms + 500) / 1000).clamp(1, u32::MAX as u64);
        Self {
            drowsy_consecutive_frames: frames as u32,
            ..Default::default()
        }
    }

    pub fn is_focused(&self, emotion: Emotion) -> bool {
        self.focused_emotions.contains(&emotion)
    }

    pub fn validate(&self) -> Result<(), FocusError> {
        if !(self.ear_threshold > 0.0 && self.ear_threshold.is_finite()) {
            return Err(FocusError::Config(format!(
                "ear_threshold must be positive, got {}",
                self.ear_threshold
            )));
        }
        if self.drowsy_consecutive_frames == 0 {
            return Err(FocusError::Config(
                "drowsy_consecutive_frames must be at least 1".into(),
            ));
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(FocusError::Config(format!(
                "ema_alpha must be in (0, 1], got {}",
                self.ema_alpha
            )));
        }
        if self.emotion_buffer_capacity == 0 {
            return Err(FocusError::Config(
                "emotion_buffer_capacity must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("min_detection_confidence", self.face_mesh.min_detection_confidence),
            ("min_tracking_confidence", self.face_mesh.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FocusError::Config(format!(
                    "face_mesh.{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FocusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.drowsy_consecutive_frames, 25);
        assert!(config.is_focused(Emotion::Neutral));
        assert!(!config.is_focused(Emotion::Sad));
        assert!(FocusConfig::sensitive().validate().is_ok());
        assert!(FocusConfig::relaxed().validate().is_ok());
    }

    #[test]
    fn test_frame_rate_preset() {
        assert_eq!(FocusConfig::for_frame_rate(15, 1670).drowsy_consecutive_frames, 25);
        assert_eq!(FocusConfig::for_frame_rate(30, 1000).drowsy_consecutive_frames, 30);
        assert_eq!(FocusConfig::for_frame_rate(1, 100).drowsy_consecutive_frames, 1);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            FocusConfig { ema_alpha: 0.0, ..Default::default() },
            FocusConfig { ema_alpha: 1.5, ..Default::default() },
            FocusConfig { ear_threshold: -0.1, ..Default::default() },
            FocusConfig { drowsy_consecutive_frames: 0, ..Default::default() },
            FocusConfig { emotion_buffer_capacity: 0, ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(FocusError::Config(_))));
        }
        assert!(FocusConfig { ema_alpha: 1.0, ..Default::default() }.validate().is_ok());
    }
}
